//! Metrics declaration and recording helpers.
//!
//! Enabled by the `metrics` cargo feature; every helper is an inlined no-op
//! otherwise.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Track number of cache hit events.
    pub static ref CACHE_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "sirocco_cache_hit_total",
            "Total number of cache hit events."
        );
        "sirocco_cache_hit_total"
    };
    /// Track number of cache miss events.
    pub static ref CACHE_MISS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "sirocco_cache_miss_total",
            "Total number of cache miss events."
        );
        "sirocco_cache_miss_total"
    };
    /// Track number of storage and network errors.
    pub static ref CACHE_ERROR_COUNTER: &'static str = {
        metrics::describe_counter!(
            "sirocco_cache_error_total",
            "Total number of storage and network errors."
        );
        "sirocco_cache_error_total"
    };
    /// Track number of evicted records.
    pub static ref CACHE_EVICTION_COUNTER: &'static str = {
        metrics::describe_counter!(
            "sirocco_cache_eviction_total",
            "Total number of records evicted by quota or pattern limits."
        );
        "sirocco_cache_eviction_total"
    };
    /// Track number of conditional revalidations.
    pub static ref CACHE_REVALIDATION_COUNTER: &'static str = {
        metrics::describe_counter!(
            "sirocco_cache_revalidation_total",
            "Total number of conditional revalidation attempts."
        );
        "sirocco_cache_revalidation_total"
    };
    /// Track number of eagerly populated records.
    pub static ref CACHE_PREFETCH_COUNTER: &'static str = {
        metrics::describe_counter!(
            "sirocco_cache_prefetch_total",
            "Total number of records populated by precache or prefetch."
        );
        "sirocco_cache_prefetch_total"
    };
    /// Track number of quota warnings emitted.
    pub static ref QUOTA_WARNING_COUNTER: &'static str = {
        metrics::describe_counter!(
            "sirocco_quota_warning_total",
            "Total number of quota warnings emitted."
        );
        "sirocco_quota_warning_total"
    };
}

#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn increment_hit() {
    metrics::counter!(*CACHE_HIT_COUNTER).increment(1);
}

#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn increment_miss() {
    metrics::counter!(*CACHE_MISS_COUNTER).increment(1);
}

#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn increment_error() {
    metrics::counter!(*CACHE_ERROR_COUNTER).increment(1);
}

#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn increment_evictions(count: u64) {
    metrics::counter!(*CACHE_EVICTION_COUNTER).increment(count);
}

#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn increment_revalidation() {
    metrics::counter!(*CACHE_REVALIDATION_COUNTER).increment(1);
}

#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn increment_prefetch() {
    metrics::counter!(*CACHE_PREFETCH_COUNTER).increment(1);
}

#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn increment_quota_warning() {
    metrics::counter!(*QUOTA_WARNING_COUNTER).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn increment_hit() {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn increment_miss() {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn increment_error() {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn increment_evictions(_count: u64) {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn increment_revalidation() {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn increment_prefetch() {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn increment_quota_warning() {}

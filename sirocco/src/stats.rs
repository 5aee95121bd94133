//! Hit/miss/error accounting.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::metrics;

/// Monotonic counters for engine activity.
///
/// These are the functional stats surface returned by the `stats`
/// administrative operation, always on; the optional `metrics` feature
/// mirrors them into the process metrics recorder.
#[derive(Debug, Default)]
pub struct StatsCollector {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    evictions: AtomicU64,
    revalidations: AtomicU64,
    prefetches: AtomicU64,
}

impl StatsCollector {
    /// Counts a response served from cache.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::increment_hit();
    }

    /// Counts a lookup the cache could not serve.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::increment_miss();
    }

    /// Counts a storage or network failure.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        metrics::increment_error();
    }

    /// Counts evicted records.
    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
        metrics::increment_evictions(count);
    }

    /// Counts a conditional revalidation attempt.
    pub fn record_revalidation(&self) {
        self.revalidations.fetch_add(1, Ordering::Relaxed);
        metrics::increment_revalidation();
    }

    /// Counts a record populated eagerly (precache or prefetch).
    pub fn record_prefetch(&self) {
        self.prefetches.fetch_add(1, Ordering::Relaxed);
        metrics::increment_prefetch();
    }

    /// Current hit count.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Current miss count.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Current error count.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Current eviction count.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Current revalidation count.
    pub fn revalidations(&self) -> u64 {
        self.revalidations.load(Ordering::Relaxed)
    }

    /// Current prefetch count.
    pub fn prefetches(&self) -> u64 {
        self.prefetches.load(Ordering::Relaxed)
    }

    /// Builds a snapshot, folding in store-derived figures.
    ///
    /// `include_prefetches` controls whether the prefetch counter appears;
    /// it is only exposed when eager caching is configured.
    pub fn snapshot(
        &self,
        entries: u64,
        storage_used: u64,
        include_prefetches: bool,
    ) -> StatsSnapshot {
        let hits = self.hits();
        let misses = self.misses();
        let lookups = hits + misses;
        StatsSnapshot {
            hits,
            misses,
            errors: self.errors(),
            evictions: self.evictions(),
            revalidations: self.revalidations(),
            prefetches: include_prefetches.then(|| self.prefetches()),
            entries,
            storage_used,
            storage_used_mb: format!("{:.2}", storage_used as f64 / (1024.0 * 1024.0)),
            hit_rate: if lookups > 0 {
                format!("{:.1}%", hits as f64 / lookups as f64 * 100.0)
            } else {
                "N/A".to_owned()
            },
        }
    }
}

/// A point-in-time view of the counters plus storage figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Responses served from cache.
    pub hits: u64,
    /// Lookups the cache could not serve.
    pub misses: u64,
    /// Storage and network failures.
    pub errors: u64,
    /// Records evicted by quota or per-pattern limits.
    pub evictions: u64,
    /// Conditional revalidation attempts.
    pub revalidations: u64,
    /// Eagerly populated records; present only with eager caching
    /// configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefetches: Option<u64>,
    /// Stored record count.
    pub entries: u64,
    /// Aggregate stored bytes.
    pub storage_used: u64,
    /// Aggregate stored bytes in mebibytes, two decimals.
    pub storage_used_mb: String,
    /// `hits / (hits + misses)` as a percentage string, or `"N/A"` with no
    /// lookups.
    pub hit_rate: String,
}

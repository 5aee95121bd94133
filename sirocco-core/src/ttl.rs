//! Effective TTL computation.

use crate::EpochMs;
use crate::metadata::ResponseMetadata;

/// Computes the effective TTL in minutes for a response.
///
/// With `respect_headers` off the rule's TTL always wins. Otherwise the
/// response's own lifetime information takes priority, most specific first:
/// `s-maxage`, then `max-age`, then `Expires` (clamped at zero), then the
/// rule's TTL.
pub fn compute_ttl(
    metadata: &ResponseMetadata,
    rule_ttl_minutes: u64,
    respect_headers: bool,
    now: EpochMs,
) -> f64 {
    if !respect_headers {
        return rule_ttl_minutes as f64;
    }
    if let Some(s_max_age) = metadata.s_max_age {
        return s_max_age as f64 / 60.0;
    }
    if let Some(max_age) = metadata.max_age {
        return max_age as f64 / 60.0;
    }
    if let Some(expires) = metadata.expires {
        return ((expires - now) as f64 / 60_000.0).max(0.0);
    }
    rule_ttl_minutes as f64
}

/// Converts a TTL in minutes to the expiry timestamp it implies.
pub fn valid_until(now: EpochMs, ttl_minutes: f64) -> EpochMs {
    now + (ttl_minutes * 60_000.0) as EpochMs
}

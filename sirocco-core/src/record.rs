//! Stored cache records.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::EpochMs;

/// A cached HTTP response with its bookkeeping fields.
///
/// The `key` is the record's sole identity. `size` always equals the body
/// length; [`CacheRecord::new`] enforces this, and the field exists so
/// stores and eviction can account bytes without touching bodies.
///
/// `valid_until` is `cached_at` (or the last successful revalidation time)
/// plus the effective TTL. `last_access` is refreshed by the store on every
/// read, whether the record is served fresh or stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Derived cache key, the unique identity of this record.
    pub key: SmolStr,
    /// Response status.
    #[serde(with = "http_serde::status_code")]
    pub status: StatusCode,
    /// Response status text.
    pub status_text: String,
    /// Stored response headers. Ordered; names unique case-insensitively.
    #[serde(with = "http_serde::header_map")]
    pub headers: HeaderMap,
    /// Response body bytes.
    pub body: Bytes,
    /// Expiry timestamp, epoch milliseconds.
    pub valid_until: EpochMs,
    /// Last read timestamp, epoch milliseconds. LRU ordering key.
    pub last_access: EpochMs,
    /// Creation timestamp, epoch milliseconds.
    pub cached_at: EpochMs,
    /// Match expression of the rule that owns this record.
    pub pattern: String,
    /// Body length in bytes.
    pub size: u64,
    /// `ETag` validator carried from the stored response.
    pub etag: Option<String>,
    /// `Last-Modified` validator carried from the stored response.
    pub last_modified: Option<String>,
    /// Whether the response demanded revalidation before reuse.
    pub must_revalidate: bool,
    /// Opaque version captured from a configured version header.
    pub cache_version: Option<String>,
}

impl CacheRecord {
    /// Builds a record, deriving `size` from the body.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        key: impl Into<SmolStr>,
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
        valid_until: EpochMs,
        now: EpochMs,
        pattern: impl Into<String>,
    ) -> Self {
        let size = body.len() as u64;
        CacheRecord {
            key: key.into(),
            status,
            status_text: status
                .canonical_reason()
                .unwrap_or_default()
                .to_owned(),
            headers,
            body,
            valid_until,
            last_access: now,
            cached_at: now,
            pattern: pattern.into(),
            size,
            etag: None,
            last_modified: None,
            must_revalidate: false,
            cache_version: None,
        }
    }

    /// Whether the record is past its `valid_until`.
    pub fn is_expired(&self, now: EpochMs) -> bool {
        now > self.valid_until
    }

    /// Minutes elapsed since `valid_until`; negative while still fresh.
    pub fn stale_age_minutes(&self, now: EpochMs) -> f64 {
        (now - self.valid_until) as f64 / 60_000.0
    }

    /// Whether the record carries a conditional-request validator.
    pub fn has_validators(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }
}

#![warn(missing_docs)]
//! # sirocco-core
//!
//! Core types for the Sirocco HTTP response caching engine.
//!
//! This crate holds the leaf building blocks the engine is assembled from.
//! Everything here is plain data and pure logic — no I/O, no clocks other
//! than timestamps passed in or read once:
//!
//! - **Derive** stable cache keys ([`derive_key`])
//! - **Extract** caching facts from response headers ([`ResponseMetadata`])
//! - **Represent** stored responses ([`CacheRecord`])
//! - **Match** requests against configured rules ([`RuleSet`])
//! - **Compute** effective time-to-live ([`compute_ttl`])
//! - **Describe** externally published invalidation state ([`ManifestDocument`])

pub mod key;
pub mod manifest;
pub mod metadata;
pub mod record;
pub mod rule;
pub mod ttl;

pub use key::derive_key;
pub use manifest::ManifestDocument;
pub use metadata::{ResponseMetadata, cacheable, guess_content_type};
pub use record::CacheRecord;
pub use rule::{CacheRule, CompiledRule, FallbackPolicy, FallbackStrategy, RuleSet};
pub use ttl::compute_ttl;

/// Epoch timestamp in milliseconds, the time unit of record bookkeeping.
pub type EpochMs = i64;

/// Returns the current time as epoch milliseconds.
pub fn now_ms() -> EpochMs {
    chrono::Utc::now().timestamp_millis()
}

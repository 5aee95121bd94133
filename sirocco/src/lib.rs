#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Engine configuration types.
///
/// [`EngineConfig`] gathers the rule list, invalidation behavior, byte
/// quota, and eager-caching setup. Everything derives serde with field
/// defaults, so configuration can come from a document or be built in
/// code.
pub mod config;

/// The administrative control seam.
///
/// Tagged [`Command`]s with typed [`CommandReply`]s, handled by the engine
/// in arrival order; [`Controller`] is the client handle with a fixed
/// reply timeout.
pub mod control;

/// Eager caching: precache at initialization and the `prefetch`
/// administrative operation.
pub mod eager;

/// Error types for engine operations.
pub mod error;

/// LRU eviction: per-pattern entry limits and quota-driven byte eviction.
pub mod eviction;

/// Manifest-driven external invalidation.
pub mod manifest;

/// Metrics declaration and recording helpers (behind the `metrics`
/// feature).
pub mod metrics;

/// Broadcast notifications (quota warnings, precache completion).
pub mod notify;

/// Detached background task tracking for fire-and-forget work.
pub mod offload;

/// Byte quota accounting and admission control.
pub mod quota;

/// Engine response types.
pub mod response;

/// Hit/miss/error accounting and the stats snapshot.
pub mod stats;

/// The network-fetch collaborator trait and timeout wrapper.
pub mod upstream;

mod engine;
mod revalidate;

pub use config::{
    EagerCacheConfig, EngineConfig, InvalidationConfig, ManifestConfig, OverflowStrategy,
    PrecacheConfig, QuotaConfig,
};
pub use control::{Command, CommandReply, ControlError, Controller, REPLY_TIMEOUT};
pub use eager::{PrefetchOutcome, PrefetchStatus};
pub use engine::{Engine, Phase};
pub use error::{EngineError, FetchError};
pub use notify::{Notification, Notifier};
pub use quota::{QuotaCheck, QuotaUsage};
pub use response::{CacheStatus, EngineResponse};
pub use stats::{StatsCollector, StatsSnapshot};
pub use upstream::{FetchRequest, FetchResponse, Fetcher, fetch_with_timeout};

pub use sirocco_core::{
    CacheRecord, CacheRule, CompiledRule, FallbackPolicy, FallbackStrategy, ManifestDocument,
    ResponseMetadata, RuleSet, compute_ttl, derive_key,
};

/// The `sirocco` prelude.
///
/// ```rust
/// use sirocco::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        CacheRule, Command, Engine, EngineConfig, EngineError, FetchRequest, Fetcher,
    };
}

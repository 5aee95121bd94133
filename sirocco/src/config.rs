//! Engine configuration.
//!
//! Plain serde structs with field defaults; everything can come from a
//! config document or be built in code. Rules are validated and compiled at
//! [`Engine::init`](crate::Engine::init) — an uncompilable pattern degrades
//! to never-matching rather than failing initialization.

use serde::{Deserialize, Serialize};
use sirocco_core::CacheRule;

/// Default byte quota: 50 MiB.
pub const DEFAULT_QUOTA_MAX_BYTES: u64 = 50 * 1024 * 1024;
/// Default quota warning threshold.
pub const DEFAULT_QUOTA_WARNING_THRESHOLD: f64 = 0.8;
/// Default manifest poll interval, milliseconds.
pub const DEFAULT_MANIFEST_INTERVAL_MS: u64 = 60_000;
/// TTL in minutes applied to eagerly cached URLs matching no rule.
pub const DEFAULT_RULE_TTL_MINUTES: u64 = 60;
/// Default retry budget for precache fetches.
pub const DEFAULT_PRECACHE_RETRIES: u32 = 2;

fn default_true() -> bool {
    true
}

fn default_quota_max_bytes() -> u64 {
    DEFAULT_QUOTA_MAX_BYTES
}

fn default_warning_threshold() -> f64 {
    DEFAULT_QUOTA_WARNING_THRESHOLD
}

fn default_manifest_interval() -> u64 {
    DEFAULT_MANIFEST_INTERVAL_MS
}

fn default_precache_retries() -> u32 {
    DEFAULT_PRECACHE_RETRIES
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Ordered caching rules; first match wins.
    #[serde(default)]
    pub rules: Vec<CacheRule>,
    /// Invalidation behavior.
    #[serde(default)]
    pub invalidation: InvalidationConfig,
    /// Byte quota; absent means unbounded.
    #[serde(default)]
    pub quota: Option<QuotaConfig>,
    /// Eager caching (precache on install, prefetch on demand).
    #[serde(default)]
    pub eager: Option<EagerCacheConfig>,
}

/// How stored records get invalidated beyond their TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationConfig {
    /// Manifest polling; absent disables the poller.
    #[serde(default)]
    pub manifest: Option<ManifestConfig>,
    /// Response header whose value is captured per record as an opaque
    /// cache version.
    #[serde(default)]
    pub version_header: Option<String>,
    /// Whether response freshness headers override rule TTLs.
    #[serde(default = "default_true")]
    pub respect_http_headers: bool,
}

impl Default for InvalidationConfig {
    fn default() -> Self {
        InvalidationConfig {
            manifest: None,
            version_header: None,
            respect_http_headers: true,
        }
    }
}

/// Manifest polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Absolute URL the manifest document is published at.
    pub url: String,
    /// Poll interval, milliseconds.
    #[serde(default = "default_manifest_interval")]
    pub interval_ms: u64,
}

/// Byte quota configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Aggregate byte budget for all stored records.
    #[serde(default = "default_quota_max_bytes")]
    pub max_bytes: u64,
    /// Fraction of the budget at which warnings start.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,
    /// What to do when a store would exceed the budget.
    #[serde(default)]
    pub on_exceeded: OverflowStrategy,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        QuotaConfig {
            max_bytes: DEFAULT_QUOTA_MAX_BYTES,
            warning_threshold: DEFAULT_QUOTA_WARNING_THRESHOLD,
            on_exceeded: OverflowStrategy::default(),
        }
    }
}

/// Quota overflow handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowStrategy {
    /// Free the needed bytes from oldest-by-`last_access` records, then
    /// admit the store.
    #[default]
    EvictLru,
    /// Reject the store; the response is still served, just not cached.
    StopCaching,
    /// Wipe the store entirely, then admit.
    ClearAll,
}

/// Eager caching configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EagerCacheConfig {
    /// URLs fetched and stored during initialization.
    #[serde(default)]
    pub precache: Option<PrecacheConfig>,
}

/// Precache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecacheConfig {
    /// URLs to fetch and store during initialization.
    pub urls: Vec<String>,
    /// Retries per URL after the first attempt fails.
    #[serde(default = "default_precache_retries")]
    pub retries: u32,
    /// Whether precache failures are tolerated (initialization proceeds).
    #[serde(default = "default_true")]
    pub fail_silently: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_deserializes_with_defaults() {
        let config: EngineConfig = serde_json::from_value(serde_json::json!({
            "rules": [{ "pattern": ".*\\.jpg$", "ttl_minutes": 60 }],
        }))
        .unwrap();
        assert_eq!(config.rules.len(), 1);
        assert!(config.invalidation.respect_http_headers);
        assert!(config.invalidation.manifest.is_none());
        assert!(config.quota.is_none());
        assert!(config.eager.is_none());
    }

    #[test]
    fn quota_strategy_names_are_kebab_case() {
        let quota: QuotaConfig = serde_json::from_value(serde_json::json!({
            "max_bytes": 1_000,
            "on_exceeded": "stop-caching",
        }))
        .unwrap();
        assert_eq!(quota.on_exceeded, OverflowStrategy::StopCaching);
        assert_eq!(quota.warning_threshold, DEFAULT_QUOTA_WARNING_THRESHOLD);
    }

    #[test]
    fn manifest_interval_defaults() {
        let config: ManifestConfig = serde_json::from_value(serde_json::json!({
            "url": "https://cms.example.com/cache-manifest.json",
        }))
        .unwrap();
        assert_eq!(config.interval_ms, DEFAULT_MANIFEST_INTERVAL_MS);
    }
}

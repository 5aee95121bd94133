//! Caching rules and the rule matcher.
//!
//! A [`CacheRule`] is configuration: a regex source, an optional method
//! filter, a TTL, per-pattern entry limits, a fetch timeout, and a fallback
//! policy. Rules compile once at load into [`CompiledRule`]s; a pattern
//! that fails to compile is logged and becomes permanently non-matching
//! rather than failing initialization or blocking the rules after it.

use http::Method;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default per-pattern entry cap.
pub const DEFAULT_MAX_ENTRIES: usize = 100;
/// Default network timeout, milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
/// Default ceiling on serving stale records, minutes (24 hours).
pub const DEFAULT_MAX_STALE_AGE_MINUTES: u64 = 1_440;

/// What to do when the network cannot satisfy a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackStrategy {
    /// Serve fresh records; on network failure fall back to a stored record
    /// unless it is too stale.
    #[default]
    StaleIfError,
    /// Serve any stored record immediately and refresh it in the background.
    StaleWhileRevalidate,
    /// Always fetch; never serve a stored record, even on failure.
    NetworkOnly,
}

/// Fallback policy for a rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FallbackPolicy {
    /// Strategy applied when the record is stale or the network fails.
    #[serde(default)]
    pub strategy: FallbackStrategy,
    /// Oldest staleness still servable under the fallback, minutes.
    #[serde(default = "default_max_stale_age")]
    pub max_stale_age_minutes: u64,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        FallbackPolicy {
            strategy: FallbackStrategy::default(),
            max_stale_age_minutes: DEFAULT_MAX_STALE_AGE_MINUTES,
        }
    }
}

fn default_max_stale_age() -> u64 {
    DEFAULT_MAX_STALE_AGE_MINUTES
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// A single caching rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRule {
    /// Regex source matched against request URLs.
    pub pattern: String,
    /// Method filter; `None` matches any method.
    #[serde(default, with = "http_serde::option::method")]
    pub method: Option<Method>,
    /// TTL for records stored under this rule, minutes.
    pub ttl_minutes: u64,
    /// Per-pattern LRU cap, enforced after every successful store.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Bound on every network call made on behalf of this rule.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Stale-fallback policy.
    #[serde(default)]
    pub fallback: FallbackPolicy,
}

impl CacheRule {
    /// A rule with defaults for everything but pattern and TTL.
    pub fn new(pattern: impl Into<String>, ttl_minutes: u64) -> Self {
        CacheRule {
            pattern: pattern.into(),
            method: None,
            ttl_minutes,
            max_entries: DEFAULT_MAX_ENTRIES,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            fallback: FallbackPolicy::default(),
        }
    }
}

/// A rule with its pattern compiled, or marked permanently non-matching.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// The source rule.
    pub rule: CacheRule,
    matcher: Option<Regex>,
}

impl CompiledRule {
    /// Compiles a rule's pattern. Failure downgrades the rule to
    /// never-matching.
    pub fn compile(rule: CacheRule) -> Self {
        let matcher = match Regex::new(&rule.pattern) {
            Ok(regex) => Some(regex),
            Err(error) => {
                warn!(pattern = %rule.pattern, %error, "rule pattern failed to compile; rule will never match");
                None
            }
        };
        CompiledRule { rule, matcher }
    }

    /// Whether this rule's pattern compiled.
    pub fn is_valid(&self) -> bool {
        self.matcher.is_some()
    }

    /// Whether the rule matches a URL/method pair.
    pub fn matches(&self, url: &str, method: &Method) -> bool {
        let Some(matcher) = &self.matcher else {
            return false;
        };
        if let Some(required) = &self.rule.method
            && required != method
        {
            return false;
        }
        matcher.is_match(url)
    }
}

/// An ordered rule list with first-match-wins dispatch.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compiles a rule list, preserving order.
    pub fn compile(rules: Vec<CacheRule>) -> Self {
        RuleSet {
            rules: rules.into_iter().map(CompiledRule::compile).collect(),
        }
    }

    /// Returns the first rule matching the URL/method pair.
    pub fn matching(&self, url: &str, method: &Method) -> Option<&CompiledRule> {
        self.rules.iter().find(|rule| rule.matches(url, method))
    }

    /// Number of configured rules, valid or not.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the rule list is empty.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterates over the compiled rules in order.
    pub fn iter(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_match_wins() {
        let rules = RuleSet::compile(vec![
            CacheRule::new(r".*\.(png|jpg)$", 60),
            CacheRule::new(r".*\.jpg$", 5),
        ]);
        let hit = rules
            .matching("https://cdn.example.com/a.jpg", &Method::GET)
            .unwrap();
        assert_eq!(hit.rule.ttl_minutes, 60);
    }

    #[test]
    fn method_filter_applies() {
        let mut rule = CacheRule::new(r".*/api/getProducts$", 1_440);
        rule.method = Some(Method::POST);
        let rules = RuleSet::compile(vec![rule]);

        assert!(rules.matching("https://x/api/getProducts", &Method::GET).is_none());
        assert!(rules.matching("https://x/api/getProducts", &Method::POST).is_some());
    }

    #[test]
    fn invalid_pattern_never_matches_and_does_not_block() {
        let rules = RuleSet::compile(vec![
            CacheRule::new(r"[unclosed", 60),
            CacheRule::new(r".*\.css$", 30),
        ]);
        assert!(!rules.iter().next().unwrap().is_valid());

        let hit = rules.matching("https://x/site.css", &Method::GET).unwrap();
        assert_eq!(hit.rule.ttl_minutes, 30);
    }

    #[test]
    fn config_defaults_fill_in() {
        let rule: CacheRule = serde_json::from_value(serde_json::json!({
            "pattern": ".*\\.jpg$",
            "ttl_minutes": 60,
        }))
        .unwrap();
        assert_eq!(rule.max_entries, DEFAULT_MAX_ENTRIES);
        assert_eq!(rule.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(rule.fallback.strategy, FallbackStrategy::StaleIfError);
        assert_eq!(rule.fallback.max_stale_age_minutes, DEFAULT_MAX_STALE_AGE_MINUTES);
        assert_eq!(rule.method, None);
    }

    #[test]
    fn fallback_strategy_names_are_kebab_case() {
        let policy: FallbackPolicy = serde_json::from_value(serde_json::json!({
            "strategy": "stale-while-revalidate",
            "max_stale_age_minutes": 2_880,
        }))
        .unwrap();
        assert_eq!(policy.strategy, FallbackStrategy::StaleWhileRevalidate);
        assert_eq!(policy.max_stale_age_minutes, 2_880);
    }
}

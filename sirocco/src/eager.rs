//! Eager caching: precache at initialization, prefetch on demand.
//!
//! Both populate the cache ahead of real traffic, and both tolerate
//! transient network failure differently from the live pipeline: precache
//! retries each URL a bounded number of times with a fixed backoff (the
//! pipeline never retries — it falls back instead).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use http::Method;
use serde::Serialize;
use sirocco_backend::RecordStore;
use sirocco_core::rule::DEFAULT_TIMEOUT_MS;
use sirocco_core::{ResponseMetadata, cacheable, compute_ttl, derive_key, now_ms};
use tracing::debug;

use crate::config::{DEFAULT_RULE_TTL_MINUTES, PrecacheConfig};
use crate::engine::EngineInner;
use crate::error::{EngineError, FetchError};
use crate::notify::Notification;
use crate::upstream::{FetchRequest, fetch_with_timeout};

/// Fixed backoff between precache retry attempts.
pub(crate) const PRECACHE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Outcome classification for the `prefetch` administrative operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrefetchStatus {
    /// Fetched and handed to the store.
    Prefetched,
    /// A fresh record already exists; no fetch was issued.
    AlreadyCached,
    /// The quota rejected admission before fetching.
    QuotaExceeded,
    /// The origin answered outside the success range.
    FetchFailed,
    /// The response may not be stored (`no-store`, cookies, status).
    NotCacheable,
    /// Transport failure reaching the origin.
    Error,
}

/// Reply payload of the `prefetch` administrative operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefetchOutcome {
    /// What happened.
    pub status: PrefetchStatus,
    /// The URL as requested.
    pub url: String,
    /// Origin status code, present for `fetch-failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    /// Transport error message, present for `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PrefetchOutcome {
    fn new(status: PrefetchStatus, url: &str) -> Self {
        PrefetchOutcome {
            status,
            url: url.to_owned(),
            http_status: None,
            error: None,
        }
    }
}

/// Runs the configured precache: deduplicate, fetch every URL with bounded
/// retries, store what is cacheable, then broadcast completion.
///
/// Fails only when the configuration says failures may fail
/// initialization (`fail_silently: false`).
pub(crate) async fn run_precache(
    inner: &Arc<EngineInner>,
    config: &PrecacheConfig,
) -> Result<(), EngineError> {
    let mut seen = HashSet::new();
    let urls: Vec<&str> = config
        .urls
        .iter()
        .map(String::as_str)
        .filter(|url| seen.insert(*url))
        .collect();
    if urls.is_empty() {
        return Ok(());
    }
    debug!(count = urls.len(), "precaching URLs");

    let results = join_all(
        urls.iter()
            .map(|url| precache_url(inner, url, config.retries)),
    )
    .await;
    let succeeded = results.iter().filter(|result| result.is_ok()).count() as u64;
    let failed = results.len() as u64 - succeeded;
    let total = urls.len() as u64;
    debug!(succeeded, failed, "precache complete");

    inner.notifier.publish(Notification::PrecacheComplete {
        succeeded,
        failed,
        total,
    });

    if failed > 0 && !config.fail_silently {
        return Err(EngineError::Precache { failed, total });
    }
    Ok(())
}

/// Fetches one precache URL, retrying with fixed backoff.
async fn precache_url(inner: &Arc<EngineInner>, url: &str, retries: u32) -> Result<(), FetchError> {
    let mut remaining = retries;
    loop {
        match try_precache(inner, url).await {
            Ok(()) => return Ok(()),
            Err(fetch_error) if remaining > 0 => {
                debug!(%url, error = %fetch_error, remaining, "precache retry");
                remaining -= 1;
                tokio::time::sleep(PRECACHE_RETRY_DELAY).await;
            }
            Err(fetch_error) => {
                debug!(%url, error = %fetch_error, "precache failed");
                return Err(fetch_error);
            }
        }
    }
}

async fn try_precache(inner: &Arc<EngineInner>, url: &str) -> Result<(), FetchError> {
    let key = derive_key(&Method::GET, url, None);
    match inner.store.get(&key).await {
        Ok(Some(record)) if !record.is_expired(now_ms()) => {
            debug!(%url, "precache skip, already cached");
            return Ok(());
        }
        Err(store_error) => {
            debug!(%url, error = %store_error, "precache lookup failed");
            inner.stats.record_error();
        }
        _ => {}
    }

    let rule = inner
        .rules
        .matching(url, &Method::GET)
        .map(|compiled| compiled.rule.clone());
    let timeout_ms = rule
        .as_ref()
        .map(|rule| rule.timeout_ms)
        .unwrap_or(DEFAULT_TIMEOUT_MS);

    let response =
        fetch_with_timeout(inner.fetcher.as_ref(), FetchRequest::get(url), timeout_ms).await?;
    if !response.is_success() {
        return Err(FetchError::message(format!("HTTP {}", response.status)));
    }

    let metadata = ResponseMetadata::extract(&response.headers);
    if !cacheable(response.status, &response.headers, &metadata) {
        debug!(%url, "precache skip, response not cacheable");
        return Ok(());
    }

    // Precache stores under the rule's own TTL; header-derived lifetimes
    // only apply on the live pipeline and prefetch.
    let ttl_minutes = rule
        .as_ref()
        .map(|rule| rule.ttl_minutes)
        .unwrap_or(DEFAULT_RULE_TTL_MINUTES) as f64;
    let pattern = rule
        .as_ref()
        .map(|rule| rule.pattern.clone())
        .unwrap_or_else(|| "precache".to_owned());

    inner
        .persist_response(&key, url, &response, metadata, ttl_minutes, &pattern, None)
        .await;
    inner.stats.record_prefetch();
    debug!(%url, "precached");
    Ok(())
}

/// Handles the `prefetch` administrative operation for one URL.
pub(crate) async fn prefetch(inner: &Arc<EngineInner>, url: &str) -> PrefetchOutcome {
    let key = derive_key(&Method::GET, url, None);
    match inner.store.get(&key).await {
        Ok(Some(record)) if !record.is_expired(now_ms()) => {
            return PrefetchOutcome::new(PrefetchStatus::AlreadyCached, url);
        }
        Err(store_error) => {
            debug!(%url, error = %store_error, "prefetch lookup failed");
            inner.stats.record_error();
        }
        _ => {}
    }

    let check = inner.quota.check(0, &inner.eviction).await;
    if !check.can_store {
        return PrefetchOutcome::new(PrefetchStatus::QuotaExceeded, url);
    }

    let rule = inner
        .rules
        .matching(url, &Method::GET)
        .map(|compiled| compiled.rule.clone());
    let timeout_ms = rule
        .as_ref()
        .map(|rule| rule.timeout_ms)
        .unwrap_or(DEFAULT_TIMEOUT_MS);

    let response =
        match fetch_with_timeout(inner.fetcher.as_ref(), FetchRequest::get(url), timeout_ms).await {
            Ok(response) => response,
            Err(fetch_error) => {
                debug!(%url, error = %fetch_error, "prefetch fetch failed");
                return PrefetchOutcome {
                    status: PrefetchStatus::Error,
                    url: url.to_owned(),
                    http_status: None,
                    error: Some(fetch_error.to_string()),
                };
            }
        };
    if !response.is_success() {
        return PrefetchOutcome {
            status: PrefetchStatus::FetchFailed,
            url: url.to_owned(),
            http_status: Some(response.status.as_u16()),
            error: None,
        };
    }

    let metadata = ResponseMetadata::extract(&response.headers);
    if !cacheable(response.status, &response.headers, &metadata) {
        return PrefetchOutcome::new(PrefetchStatus::NotCacheable, url);
    }

    let rule_ttl = rule
        .as_ref()
        .map(|rule| rule.ttl_minutes)
        .unwrap_or(DEFAULT_RULE_TTL_MINUTES);
    let ttl_minutes = compute_ttl(
        &metadata,
        rule_ttl,
        inner.config.invalidation.respect_http_headers,
        now_ms(),
    );
    let pattern = rule
        .as_ref()
        .map(|rule| rule.pattern.clone())
        .unwrap_or_else(|| "prefetch".to_owned());
    let max_entries = rule.as_ref().map(|rule| rule.max_entries);

    inner
        .persist_response(
            &key,
            url,
            &response,
            metadata,
            ttl_minutes,
            &pattern,
            max_entries,
        )
        .await;
    inner.stats.record_prefetch();
    debug!(%url, "prefetched");
    PrefetchOutcome::new(PrefetchStatus::Prefetched, url)
}

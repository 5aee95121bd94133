//! Freshness classification and the per-rule fallback strategies.
//!
//! This is the request pipeline. Dispatch happens on the matched rule's
//! strategy:
//!
//! - **network-only** — always fetch; failures propagate to the caller.
//! - **stale-while-revalidate** — any stored record is served immediately;
//!   a refresh runs as a detached background task whose failures never
//!   touch the already-returned response.
//! - **stale-if-error** — fresh records are served; records needing
//!   revalidation that carry validators get a conditional fetch (a 304
//!   extends validity without replacing the body); network failure falls
//!   back to the stored record unless it is too stale.
//!
//! Every network call is bounded by the rule's timeout; timing out aborts
//! the call and counts as a plain network failure.

use std::sync::Arc;

use http::{HeaderValue, StatusCode, header};
use sirocco_backend::RecordStore;
use sirocco_core::rule::{CacheRule, CompiledRule, FallbackStrategy};
use sirocco_core::{
    CacheRecord, EpochMs, ResponseMetadata, cacheable, compute_ttl, derive_key, now_ms, ttl,
};
use smol_str::SmolStr;
use tracing::debug;

use crate::engine::EngineInner;
use crate::error::{EngineError, FetchError};
use crate::response::{CacheStatus, EngineResponse};
use crate::upstream::{FetchRequest, FetchResponse, fetch_with_timeout};

/// Freshness classification of a stored record at one point in time.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Freshness {
    pub is_expired: bool,
    pub is_too_stale: bool,
    pub needs_revalidation: bool,
}

impl Freshness {
    pub(crate) fn classify(record: &CacheRecord, now: EpochMs, max_stale_age_minutes: u64) -> Self {
        let is_expired = record.is_expired(now);
        Freshness {
            is_expired,
            is_too_stale: record.stale_age_minutes(now) > max_stale_age_minutes as f64,
            needs_revalidation: record.must_revalidate || is_expired,
        }
    }
}

/// Runs the pipeline for a request under its matched rule.
pub(crate) async fn run(
    inner: &Arc<EngineInner>,
    request: FetchRequest,
    compiled: &CompiledRule,
) -> Result<EngineResponse, EngineError> {
    let rule = &compiled.rule;
    let key = derive_key(&request.method, &request.url, request.body.as_deref());
    let cached = lookup(inner, &key, rule.fallback.max_stale_age_minutes).await;

    match rule.fallback.strategy {
        FallbackStrategy::NetworkOnly => network_only(inner, request, rule, &key).await,
        FallbackStrategy::StaleWhileRevalidate => {
            stale_while_revalidate(inner, request, rule, key, cached).await
        }
        FallbackStrategy::StaleIfError => stale_if_error(inner, request, rule, key, cached).await,
    }
}

async fn lookup(
    inner: &EngineInner,
    key: &str,
    max_stale_age_minutes: u64,
) -> Option<(CacheRecord, Freshness)> {
    match inner.store.get(key).await {
        Ok(Some(record)) => {
            let freshness = Freshness::classify(&record, now_ms(), max_stale_age_minutes);
            Some((record, freshness))
        }
        Ok(None) => None,
        Err(store_error) => {
            debug!(%key, error = %store_error, "cache lookup failed");
            inner.stats.record_error();
            None
        }
    }
}

/// Always fetch. A stored record is never served, and network failure
/// propagates to the caller.
async fn network_only(
    inner: &Arc<EngineInner>,
    request: FetchRequest,
    rule: &CacheRule,
    key: &SmolStr,
) -> Result<EngineResponse, EngineError> {
    inner.stats.record_miss();
    if inner.verbose() {
        debug!(url = %request.url, "cache miss (network-only)");
    }
    let response =
        match fetch_with_timeout(inner.fetcher.as_ref(), request.clone(), rule.timeout_ms).await {
            Ok(response) => response,
            Err(fetch_error) => {
                inner.stats.record_error();
                return Err(fetch_error.into());
            }
        };
    store_if_cacheable(inner, key, &request, &response, rule).await;
    Ok(EngineResponse::from_fetch(response))
}

/// Serve whatever is stored, refresh behind the response when needed.
async fn stale_while_revalidate(
    inner: &Arc<EngineInner>,
    request: FetchRequest,
    rule: &CacheRule,
    key: SmolStr,
    cached: Option<(CacheRecord, Freshness)>,
) -> Result<EngineResponse, EngineError> {
    let Some((record, freshness)) = cached else {
        return fetch_fresh(inner, request, rule, key, None).await;
    };

    inner.stats.record_hit();
    if inner.verbose() {
        debug!(url = %request.url, "cache hit");
    }

    if freshness.needs_revalidation {
        // Fire-and-forget: the refresh outcome feeds only logs and stats,
        // never the response already being returned.
        let task_inner = Arc::clone(inner);
        let task_rule = rule.clone();
        let task_request = request.clone();
        let task_key = key.clone();
        inner.tasks.spawn("revalidate", async move {
            match fetch_with_timeout(
                task_inner.fetcher.as_ref(),
                task_request.clone(),
                task_rule.timeout_ms,
            )
            .await
            {
                Ok(response) => {
                    store_if_cacheable(&task_inner, &task_key, &task_request, &response, &task_rule)
                        .await;
                }
                Err(fetch_error) => {
                    debug!(url = %task_request.url, error = %fetch_error, "background revalidation failed");
                }
            }
        });
    }

    let status = if freshness.is_expired {
        CacheStatus::Stale
    } else {
        CacheStatus::Hit
    };
    Ok(EngineResponse::from_record(&record, status))
}

/// Serve fresh records, revalidate conditionally where possible, fall back
/// to stale on failure.
async fn stale_if_error(
    inner: &Arc<EngineInner>,
    request: FetchRequest,
    rule: &CacheRule,
    key: SmolStr,
    cached: Option<(CacheRecord, Freshness)>,
) -> Result<EngineResponse, EngineError> {
    match cached {
        Some((record, freshness)) if !freshness.needs_revalidation => {
            inner.stats.record_hit();
            if inner.verbose() {
                debug!(url = %request.url, "cache hit");
            }
            Ok(EngineResponse::from_record(&record, CacheStatus::Hit))
        }
        Some((record, freshness)) if record.has_validators() => {
            revalidate_conditional(inner, request, rule, key, record, freshness).await
        }
        other => fetch_fresh(inner, request, rule, key, other).await,
    }
}

/// Conditional fetch against the record's validators. Single attempt; on
/// failure the record itself is the fallback.
async fn revalidate_conditional(
    inner: &EngineInner,
    request: FetchRequest,
    rule: &CacheRule,
    key: SmolStr,
    record: CacheRecord,
    freshness: Freshness,
) -> Result<EngineResponse, EngineError> {
    inner.stats.record_revalidation();
    if inner.verbose() {
        debug!(url = %request.url, "revalidating");
    }
    let conditional = conditional_request(&request, &record);
    match fetch_with_timeout(inner.fetcher.as_ref(), conditional, rule.timeout_ms).await {
        Ok(response) if response.status == StatusCode::NOT_MODIFIED => {
            inner.stats.record_hit();
            if inner.verbose() {
                debug!(url = %request.url, "not modified; extending validity");
            }
            let now = now_ms();
            let mut refreshed = record.clone();
            refreshed.valid_until = ttl::valid_until(now, rule.ttl_minutes as f64);
            refreshed.last_access = now;
            // Same body, same size; the byte ledger is unaffected.
            if let Err(store_error) = inner.store.put(refreshed).await {
                debug!(%key, error = %store_error, "persisting extended validity failed");
                inner.stats.record_error();
            }
            Ok(EngineResponse::from_record(&record, CacheStatus::Hit))
        }
        Ok(response) => {
            inner.stats.record_miss();
            store_if_cacheable(inner, &key, &request, &response, rule).await;
            Ok(EngineResponse::from_fetch(response))
        }
        Err(fetch_error) => {
            inner.stats.record_error();
            debug!(url = %request.url, error = %fetch_error, "revalidation fetch failed");
            serve_stale_or_unavailable(Some((record, freshness)), &fetch_error)
        }
    }
}

/// Plain fetch for a request with no servable record; `fallback` is
/// whatever unusable record exists, kept for the error path.
async fn fetch_fresh(
    inner: &EngineInner,
    request: FetchRequest,
    rule: &CacheRule,
    key: SmolStr,
    fallback: Option<(CacheRecord, Freshness)>,
) -> Result<EngineResponse, EngineError> {
    inner.stats.record_miss();
    if inner.verbose() {
        debug!(url = %request.url, "cache miss");
    }
    match fetch_with_timeout(inner.fetcher.as_ref(), request.clone(), rule.timeout_ms).await {
        Ok(response) => {
            store_if_cacheable(inner, &key, &request, &response, rule).await;
            Ok(EngineResponse::from_fetch(response))
        }
        Err(fetch_error) => {
            inner.stats.record_error();
            debug!(url = %request.url, error = %fetch_error, "network fetch failed");
            serve_stale_or_unavailable(fallback, &fetch_error)
        }
    }
}

fn serve_stale_or_unavailable(
    fallback: Option<(CacheRecord, Freshness)>,
    error: &FetchError,
) -> Result<EngineResponse, EngineError> {
    if let Some((record, freshness)) = fallback
        && !freshness.is_too_stale
    {
        debug!(key = %record.key, "serving stale record after network failure");
        return Ok(EngineResponse::from_record(&record, CacheStatus::Stale));
    }
    Ok(EngineResponse::unavailable(&error.to_string()))
}

/// Stores a response if HTTP semantics allow, under the rule's pattern and
/// limits.
async fn store_if_cacheable(
    inner: &EngineInner,
    key: &SmolStr,
    request: &FetchRequest,
    response: &FetchResponse,
    rule: &CacheRule,
) {
    let mut metadata = ResponseMetadata::extract(&response.headers);
    if let Some(version_header) = &inner.config.invalidation.version_header {
        metadata = metadata.with_version_from(&response.headers, version_header);
    }
    if !cacheable(response.status, &response.headers, &metadata) {
        debug!(url = %request.url, "response not cacheable");
        return;
    }
    let ttl_minutes = compute_ttl(
        &metadata,
        rule.ttl_minutes,
        inner.config.invalidation.respect_http_headers,
        now_ms(),
    );
    inner
        .persist_response(
            key,
            &request.url,
            response,
            metadata,
            ttl_minutes,
            &rule.pattern,
            Some(rule.max_entries),
        )
        .await;
}

fn conditional_request(request: &FetchRequest, record: &CacheRecord) -> FetchRequest {
    let mut conditional = request.clone();
    if let Some(etag) = &record.etag
        && let Ok(value) = HeaderValue::from_str(etag)
    {
        conditional.headers.insert(header::IF_NONE_MATCH, value);
    }
    if let Some(last_modified) = &record.last_modified
        && let Ok(value) = HeaderValue::from_str(last_modified)
    {
        conditional.headers.insert(header::IF_MODIFIED_SINCE, value);
    }
    conditional
}

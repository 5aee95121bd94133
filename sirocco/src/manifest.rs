//! Manifest-driven external invalidation.
//!
//! A CMS or publisher exposes a JSON manifest carrying an opaque version
//! and per-pattern cutoff timestamps. The poller fetches it once at
//! activation and then on a fixed interval; on a version change, stored
//! records matching a pattern and cached before its cutoff are deleted.
//! The poller runs as an independent task with no ordering guarantee
//! relative to concurrently arriving requests, and every failure is
//! logged, never fatal.

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use sirocco_backend::{DeleteStatus, RecordStore};
use sirocco_core::manifest::parse_cutoff;
use sirocco_core::rule::DEFAULT_TIMEOUT_MS;
use sirocco_core::{EpochMs, ManifestDocument};
use tracing::debug;

use crate::config::ManifestConfig;
use crate::engine::{EngineInner, lock};
use crate::upstream::{FetchRequest, fetch_with_timeout};

/// One poll: fetch, parse, compare versions, invalidate on change.
pub(crate) async fn poll_once(inner: &Arc<EngineInner>, config: &ManifestConfig) {
    let request = FetchRequest::get(&config.url);
    let response =
        match fetch_with_timeout(inner.fetcher.as_ref(), request, DEFAULT_TIMEOUT_MS).await {
            Ok(response) => response,
            Err(fetch_error) => {
                debug!(url = %config.url, error = %fetch_error, "manifest poll failed");
                return;
            }
        };
    if !response.is_success() {
        debug!(url = %config.url, status = %response.status, "manifest fetch failed");
        return;
    }

    let document: ManifestDocument = match serde_json::from_slice(&response.body) {
        Ok(document) => document,
        Err(parse_error) => {
            debug!(url = %config.url, error = %parse_error, "manifest parse failed");
            return;
        }
    };

    let Some(version) = document.version else {
        return;
    };
    let changed = {
        let mut last_seen = lock(&inner.manifest_version);
        if last_seen.as_deref() != Some(version.as_str()) {
            debug!(from = ?*last_seen, to = %version, "manifest version changed");
            *last_seen = Some(version);
            true
        } else {
            false
        }
    };

    if changed && !document.patterns.is_empty() {
        let invalidated = invalidate_by_manifest(inner, &document.patterns).await;
        if invalidated > 0 {
            debug!(invalidated, "manifest invalidation removed records");
        }
    }
}

/// Deletes records matching any manifest pattern whose `cached_at`
/// precedes the pattern's cutoff. Two-phase: snapshot, then delete each
/// victim in its own transaction. Invalid regexes and unparsable
/// timestamps skip their entry.
pub(crate) async fn invalidate_by_manifest(
    inner: &EngineInner,
    patterns: &BTreeMap<String, String>,
) -> u64 {
    let cutoffs: Vec<(Regex, EpochMs)> = patterns
        .iter()
        .filter_map(|(pattern, timestamp)| {
            let regex = Regex::new(pattern).ok()?;
            let cutoff = parse_cutoff(timestamp)?;
            Some((regex, cutoff))
        })
        .collect();
    if cutoffs.is_empty() {
        return 0;
    }

    let records = match inner.store.snapshot().await {
        Ok(records) => records,
        Err(store_error) => {
            debug!(error = %store_error, "store snapshot failed during manifest invalidation");
            inner.stats.record_error();
            return 0;
        }
    };

    let mut invalidated = 0;
    let mut freed = 0;
    for record in records {
        let outdated = cutoffs
            .iter()
            .any(|(regex, cutoff)| regex.is_match(&record.key) && record.cached_at < *cutoff);
        if !outdated {
            continue;
        }
        match inner.store.delete(&record.key).await {
            Ok(DeleteStatus::Deleted(_)) => {
                invalidated += 1;
                freed += record.size;
                debug!(key = %record.key, "invalidated by manifest");
            }
            Ok(DeleteStatus::Missing) => {}
            Err(store_error) => {
                debug!(key = %record.key, error = %store_error, "manifest delete failed");
                inner.stats.record_error();
            }
        }
    }
    inner.ledger.subtract(freed);
    invalidated
}

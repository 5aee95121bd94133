//! LRU eviction: per-pattern entry limits and quota-driven byte eviction.

use std::sync::Arc;

use sirocco_backend::RecordStore;
use tracing::debug;

use crate::quota::ByteLedger;
use crate::stats::StatsCollector;

/// Deletes records in oldest-`last_access`-first order.
///
/// Both eviction flavors run as two-phase operations: scan a snapshot,
/// decide the victims, then delete them key by key. Each delete is its own
/// store transaction.
#[derive(Clone)]
pub struct EvictionEngine {
    store: Arc<dyn RecordStore>,
    stats: Arc<StatsCollector>,
    ledger: Arc<ByteLedger>,
}

impl std::fmt::Debug for EvictionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvictionEngine").finish_non_exhaustive()
    }
}

impl EvictionEngine {
    pub(crate) fn new(
        store: Arc<dyn RecordStore>,
        stats: Arc<StatsCollector>,
        ledger: Arc<ByteLedger>,
    ) -> Self {
        EvictionEngine {
            store,
            stats,
            ledger,
        }
    }

    /// Caps the number of records stored under one pattern.
    ///
    /// Runs after every successful store whose rule declares a limit. With
    /// `count > max_entries`, exactly the `count - max_entries` records
    /// with the oldest `last_access` are deleted. Returns how many were.
    pub(crate) async fn enforce_pattern_limit(&self, pattern: &str, max_entries: usize) -> u64 {
        let mut records = match self.store.scan_pattern(pattern).await {
            Ok(records) => records,
            Err(error) => {
                debug!(%pattern, %error, "pattern scan failed during eviction");
                self.stats.record_error();
                return 0;
            }
        };
        if records.len() <= max_entries {
            return 0;
        }

        records.sort_by_key(|record| record.last_access);
        let excess = records.len() - max_entries;
        let mut evicted = 0;
        let mut freed = 0;
        for record in records.into_iter().take(excess) {
            match self.store.delete(&record.key).await {
                Ok(_) => {
                    evicted += 1;
                    freed += record.size;
                }
                Err(error) => {
                    debug!(key = %record.key, %error, "evicting record failed");
                    self.stats.record_error();
                }
            }
        }

        self.ledger.subtract(freed);
        self.stats.record_evictions(evicted);
        debug!(%pattern, evicted, "enforced pattern entry limit");
        evicted
    }

    /// Frees at least `bytes_needed` bytes of oldest-by-`last_access`
    /// records, or everything if the store holds less. Returns bytes freed.
    pub(crate) async fn evict_lru_bytes(&self, bytes_needed: u64) -> u64 {
        let ordered = match self.store.scan_lru(usize::MAX).await {
            Ok(records) => records,
            Err(error) => {
                debug!(%error, "LRU scan failed during eviction");
                self.stats.record_error();
                return 0;
            }
        };

        let mut freed = 0;
        let mut evicted = 0;
        for record in ordered {
            if freed >= bytes_needed {
                break;
            }
            match self.store.delete(&record.key).await {
                Ok(_) => {
                    freed += record.size;
                    evicted += 1;
                }
                Err(error) => {
                    debug!(key = %record.key, %error, "evicting record failed");
                    self.stats.record_error();
                }
            }
        }

        self.ledger.subtract(freed);
        self.stats.record_evictions(evicted);
        debug!(freed, evicted, "evicted LRU records for quota");
        freed
    }

    /// Wipes the store and resets the ledger (the `clear-all` overflow
    /// strategy). Does not count as eviction.
    pub(crate) async fn wipe_store(&self) -> bool {
        match self.store.clear().await {
            Ok(()) => {
                self.ledger.set(0);
                debug!("store cleared by quota overflow strategy");
                true
            }
            Err(error) => {
                debug!(%error, "clearing store failed");
                self.stats.record_error();
                false
            }
        }
    }
}

//! Concurrent-map record store.

use async_trait::async_trait;
use dashmap::DashMap;
use sirocco_backend::{DeleteStatus, PutStatus, RecordStore, StoreResult};
use sirocco_core::{CacheRecord, now_ms};
use smol_str::SmolStr;

/// In-memory record store on a sharded concurrent map.
///
/// Reads lock only the touched shard, so independent request pipelines
/// proceed without contention. Same-key writers serialize on the shard
/// lock and resolve last-write-wins in completion order.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: DashMap<SmolStr, CacheRecord>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        InMemoryStore {
            records: DashMap::new(),
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn put(&self, record: CacheRecord) -> StoreResult<PutStatus> {
        match self.records.insert(record.key.clone(), record) {
            Some(previous) => Ok(PutStatus::Replaced {
                previous_size: previous.size,
            }),
            None => Ok(PutStatus::Created),
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Option<CacheRecord>> {
        Ok(self.records.get_mut(key).map(|mut entry| {
            entry.last_access = now_ms();
            entry.clone()
        }))
    }

    async fn delete(&self, key: &str) -> StoreResult<DeleteStatus> {
        match self.records.remove(key) {
            Some(_) => Ok(DeleteStatus::Deleted(1)),
            None => Ok(DeleteStatus::Missing),
        }
    }

    async fn delete_matching(
        &self,
        predicate: &(dyn for<'a> Fn(&'a str) -> bool + Send + Sync),
    ) -> StoreResult<u64> {
        // Two-phase: snapshot matching keys, then delete key by key.
        let matched: Vec<SmolStr> = self
            .records
            .iter()
            .filter(|entry| predicate(entry.key().as_str()))
            .map(|entry| entry.key().clone())
            .collect();
        let mut deleted = 0;
        for key in matched {
            if self.records.remove(&key).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn clear(&self) -> StoreResult<()> {
        self.records.clear();
        Ok(())
    }

    async fn count(&self) -> StoreResult<u64> {
        Ok(self.records.len() as u64)
    }

    async fn total_bytes(&self) -> StoreResult<u64> {
        Ok(self.records.iter().map(|entry| entry.size).sum())
    }

    async fn snapshot(&self) -> StoreResult<Vec<CacheRecord>> {
        Ok(self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn scan_lru(&self, limit: usize) -> StoreResult<Vec<CacheRecord>> {
        let mut all: Vec<CacheRecord> = self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(|record| record.last_access);
        all.truncate(limit);
        Ok(all)
    }

    async fn scan_pattern(&self, pattern: &str) -> StoreResult<Vec<CacheRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|entry| entry.pattern == pattern)
            .map(|entry| entry.value().clone())
            .collect())
    }
}

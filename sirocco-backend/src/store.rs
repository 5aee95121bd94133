//! The record store trait.

use std::sync::Arc;

use async_trait::async_trait;
use sirocco_core::CacheRecord;

use crate::StoreError;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutStatus {
    /// The key was new.
    Created,
    /// An existing record was replaced; carries its byte size so callers
    /// can keep byte accounting exact.
    Replaced {
        /// Body size of the replaced record.
        previous_size: u64,
    },
}

/// Outcome of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    /// Records were deleted.
    Deleted(u64),
    /// The key was not present.
    Missing,
}

/// Keyed, transactional storage for cache records.
///
/// Implementations must make each method a single atomic transaction; the
/// engine performs no locking of its own on top. `get` has one mandated
/// side effect: it refreshes the record's `last_access` unconditionally,
/// hit or stale, because LRU ordering is driven by reads.
///
/// Scans are snapshots. An implementation must never expose an iterator
/// whose underlying set can change mid-walk; deletions driven by a scan
/// happen against the returned snapshot, key by key.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Upserts a record under its key.
    async fn put(&self, record: CacheRecord) -> StoreResult<PutStatus>;

    /// Fetches a record, refreshing its `last_access` to now.
    async fn get(&self, key: &str) -> StoreResult<Option<CacheRecord>>;

    /// Deletes a record by key.
    async fn delete(&self, key: &str) -> StoreResult<DeleteStatus>;

    /// Deletes every record whose key satisfies the predicate. Returns the
    /// number deleted.
    async fn delete_matching(
        &self,
        predicate: &(dyn for<'a> Fn(&'a str) -> bool + Send + Sync),
    ) -> StoreResult<u64>;

    /// Deletes everything.
    async fn clear(&self) -> StoreResult<()>;

    /// Number of stored records.
    async fn count(&self) -> StoreResult<u64>;

    /// Sum of stored record sizes in bytes.
    async fn total_bytes(&self) -> StoreResult<u64>;

    /// Snapshot of every stored record, unspecified order.
    async fn snapshot(&self) -> StoreResult<Vec<CacheRecord>>;

    /// Up to `limit` records ordered by ascending `last_access` (the
    /// eviction order).
    async fn scan_lru(&self, limit: usize) -> StoreResult<Vec<CacheRecord>>;

    /// Every record tagged with the given owning pattern.
    async fn scan_pattern(&self, pattern: &str) -> StoreResult<Vec<CacheRecord>>;
}

#[async_trait]
impl<T> RecordStore for Arc<T>
where
    T: RecordStore + ?Sized,
{
    async fn put(&self, record: CacheRecord) -> StoreResult<PutStatus> {
        (**self).put(record).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<CacheRecord>> {
        (**self).get(key).await
    }

    async fn delete(&self, key: &str) -> StoreResult<DeleteStatus> {
        (**self).delete(key).await
    }

    async fn delete_matching(
        &self,
        predicate: &(dyn for<'a> Fn(&'a str) -> bool + Send + Sync),
    ) -> StoreResult<u64> {
        (**self).delete_matching(predicate).await
    }

    async fn clear(&self) -> StoreResult<()> {
        (**self).clear().await
    }

    async fn count(&self) -> StoreResult<u64> {
        (**self).count().await
    }

    async fn total_bytes(&self) -> StoreResult<u64> {
        (**self).total_bytes().await
    }

    async fn snapshot(&self) -> StoreResult<Vec<CacheRecord>> {
        (**self).snapshot().await
    }

    async fn scan_lru(&self, limit: usize) -> StoreResult<Vec<CacheRecord>> {
        (**self).scan_lru(limit).await
    }

    async fn scan_pattern(&self, pattern: &str) -> StoreResult<Vec<CacheRecord>> {
        (**self).scan_pattern(pattern).await
    }
}

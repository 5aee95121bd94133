//! Detached background task tracking.
//!
//! Stale-while-revalidate refreshes and the manifest poller run as
//! fire-and-forget tasks: they must never block, delay, or fail the
//! response already handed back to the originator. [`TaskTracker`] spawns
//! them detached, keeps handles so [`Engine::shutdown`](crate::Engine::shutdown)
//! can abort everything, and lets tests drain in-flight work
//! deterministically.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use smol_str::SmolStr;
use tokio::task::JoinHandle;
use tracing::{Instrument, info_span};

#[derive(Debug, Default)]
struct TrackerInner {
    tasks: DashMap<u64, JoinHandle<()>>,
    next_id: AtomicU64,
}

/// Tracks detached background tasks.
///
/// Clones share state; dropping the tracker does not cancel tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskTracker {
    inner: Arc<TrackerInner>,
}

impl TaskTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        TaskTracker::default()
    }

    /// Spawns a detached task.
    ///
    /// `kind` labels the task in traces ("revalidate", "manifest-poll",
    /// "control"). The task's outcome feeds only logs and stats; nothing
    /// awaits it.
    pub fn spawn<F>(&self, kind: impl Into<SmolStr>, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let kind = kind.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let span = info_span!("background_task", kind = %kind, id);
        let handle = tokio::spawn(
            async move {
                task.await;
                inner.tasks.remove(&id);
            }
            .instrument(span),
        );
        self.inner.tasks.insert(id, handle);
    }

    /// Number of tasks not yet finished.
    pub fn active_count(&self) -> usize {
        self.inner
            .tasks
            .iter()
            .filter(|entry| !entry.is_finished())
            .count()
    }

    /// Aborts every tracked task.
    pub fn cancel_all(&self) {
        for entry in self.inner.tasks.iter() {
            entry.abort();
        }
        self.inner.tasks.clear();
    }

    /// Waits until every tracked task has finished.
    ///
    /// Intended for tests and orderly shutdown; yields between checks
    /// instead of busy-waiting.
    pub async fn wait_all(&self) {
        loop {
            self.inner.tasks.retain(|_, handle| !handle.is_finished());
            if self.inner.tasks.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
    }
}

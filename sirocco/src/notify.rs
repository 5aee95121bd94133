//! Broadcast notifications to listening clients.

use serde::Serialize;
use tokio::sync::broadcast;

/// Events broadcast to whoever subscribed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Notification {
    /// Quota usage entered the warning band. Re-emitted on every admission
    /// check that lands in the band; listeners debounce if they care.
    QuotaWarning {
        /// Projected usage as a fraction of the quota.
        percentage: f64,
        /// Bytes currently stored.
        used: u64,
        /// Configured quota in bytes.
        max: u64,
    },
    /// A precache run finished.
    PrecacheComplete {
        /// URLs stored or already present.
        succeeded: u64,
        /// URLs that failed after retries.
        failed: u64,
        /// URLs attempted (after deduplication).
        total: u64,
    },
}

/// Fan-out handle for [`Notification`]s.
///
/// Publishing with no subscribers is not an error; events simply go
/// nowhere, the same as posting to zero clients.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Notifier {
    /// Creates a notifier with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Notifier { sender }
    }

    /// Subscribes to future notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Publishes a notification to all current subscribers.
    pub fn publish(&self, notification: Notification) {
        let _ = self.sender.send(notification);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Notifier::new(16)
    }
}

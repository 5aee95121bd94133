//! The administrative control seam.
//!
//! Administrative operations arrive over an external transport; this
//! module is the engine-side seam: a tagged [`Command`] enum, a typed
//! [`CommandReply`], and a [`Controller`] client handle doing
//! request/reply over an in-process channel with a fixed reply timeout.
//! Sending with no active channel (before `init`, after `shutdown`) fails
//! fast as a precondition error.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::eager::PrefetchOutcome;
use crate::engine::EngineInner;
use crate::quota::QuotaUsage;
use crate::stats::StatsSnapshot;

/// How long a [`Controller::send`] waits for its reply.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// An administrative command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Command {
    /// Delete every stored record.
    Clear,
    /// Delete records whose keys match a regex.
    ClearPattern {
        /// Regex source matched against record keys.
        pattern: String,
    },
    /// Delete one record by URL.
    InvalidateUrl {
        /// The record's URL (its key for idempotent entries).
        url: String,
    },
    /// Snapshot the counters.
    Stats,
    /// Report quota usage.
    Quota,
    /// Toggle process-wide verbose logging.
    Debug,
    /// Eagerly fetch and store one URL.
    Prefetch {
        /// Absolute URL to populate.
        url: String,
    },
}

/// Typed reply to a [`Command`], variant for variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandReply {
    /// Reply to [`Command::Clear`]: whether the wipe succeeded.
    Cleared(bool),
    /// Reply to [`Command::ClearPattern`]: records deleted.
    PatternCleared(u64),
    /// Reply to [`Command::InvalidateUrl`]: whether a record existed.
    UrlInvalidated(bool),
    /// Reply to [`Command::Stats`].
    Stats(StatsSnapshot),
    /// Reply to [`Command::Quota`].
    Quota(QuotaUsage),
    /// Reply to [`Command::Debug`]: the new debug flag.
    Debug {
        /// Verbose logging state after the toggle.
        debug_mode: bool,
    },
    /// Reply to [`Command::Prefetch`].
    Prefetch(PrefetchOutcome),
}

/// Failure surface of the control seam.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    /// No channel is active: the engine was never initialized or has shut
    /// down.
    #[error("no active control channel")]
    NoActiveChannel,
    /// The reply did not arrive within [`REPLY_TIMEOUT`].
    #[error("control channel reply timed out")]
    Timeout,
    /// The engine went away while the command was in flight.
    #[error("engine shut down while handling the command")]
    Closed,
}

pub(crate) type ControlRequest = (Command, oneshot::Sender<CommandReply>);

/// Client handle for sending administrative commands.
#[derive(Debug, Clone)]
pub struct Controller {
    sender: Option<mpsc::Sender<ControlRequest>>,
}

impl Controller {
    pub(crate) fn new(sender: Option<mpsc::Sender<ControlRequest>>) -> Self {
        Controller { sender }
    }

    /// Sends a command and awaits its reply, bounded by [`REPLY_TIMEOUT`].
    pub async fn send(&self, command: Command) -> Result<CommandReply, ControlError> {
        let sender = self.sender.as_ref().ok_or(ControlError::NoActiveChannel)?;
        let (reply_sender, reply_receiver) = oneshot::channel();
        tokio::time::timeout(REPLY_TIMEOUT, async {
            sender
                .send((command, reply_sender))
                .await
                .map_err(|_| ControlError::Closed)?;
            reply_receiver.await.map_err(|_| ControlError::Closed)
        })
        .await
        .map_err(|_| ControlError::Timeout)?
    }
}

/// Engine-side command loop; one task, commands handled in arrival order.
pub(crate) async fn run_loop(inner: Arc<EngineInner>, mut receiver: mpsc::Receiver<ControlRequest>) {
    while let Some((command, reply)) = receiver.recv().await {
        let result = inner.execute_command(command).await;
        // A caller that gave up on the reply is not an error.
        let _ = reply.send(result);
    }
}

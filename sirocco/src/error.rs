//! Error types for engine operations.

use sirocco_backend::StoreError;
use thiserror::Error;

/// Failure surface of the network-fetch collaborator.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The call exceeded its time budget and was aborted.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// Transport-level failure reaching the origin.
    #[error(transparent)]
    Transport(Box<dyn std::error::Error + Send + Sync>),
}

impl FetchError {
    /// Wraps any error as a transport failure.
    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        FetchError::Transport(Box::new(error))
    }

    /// Builds a transport failure from a plain message.
    pub fn message(message: impl Into<String>) -> Self {
        FetchError::Transport(message.into().into())
    }
}

/// Top-of-pipeline error type.
///
/// The request pipeline converts almost everything into a fallback response
/// or a structured unavailable payload; `EngineError` is what remains —
/// `network-only` propagation and storage failures surfaced to embedders.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Storage transaction failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Network failure propagated under the `network-only` strategy.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Configuration rejected at initialization.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A precache run configured not to fail silently did not complete.
    #[error("precache failed for {failed} of {total} URLs")]
    Precache {
        /// URLs that failed after retries.
        failed: u64,
        /// URLs attempted.
        total: u64,
    },
}

//! Error types for store operations.

use thiserror::Error;

/// Error type for record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Internal store error, state or computation failure.
    ///
    /// Any failure not related to reaching the store.
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),

    /// Failure communicating with a remote store.
    #[error(transparent)]
    Connection(Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wraps any error as an internal store error.
    pub fn internal<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Internal(Box::new(error))
    }
}

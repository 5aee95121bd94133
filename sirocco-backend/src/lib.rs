#![warn(missing_docs)]
//! # sirocco-backend
//!
//! The persistent-store collaborator contract for the Sirocco caching
//! engine.
//!
//! The engine never talks to storage directly; it is handed something
//! implementing [`RecordStore`]. The trait's contract carries the
//! engine's whole concurrency model: **every operation is a single atomic
//! transaction, and nothing else is guaranteed**. Concurrent writers to
//! the same key resolve last-write-wins by transaction completion order.

pub mod error;
pub mod store;

pub use error::StoreError;
pub use store::{DeleteStatus, PutStatus, RecordStore, StoreResult};

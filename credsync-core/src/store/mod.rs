//! External credential store contract.
//!
//! This module provides:
//! - [`CredentialStore`] - Trait over the provider that owns credential records
//! - [`StoreEvent`] - Change notifications published by the provider
//! - [`StoreError`] - Failures reported by a provider
//! - [`MemoryStore`] - In-memory provider for tests and standalone runs
//!
//! The store is the source of truth. The cache in [`crate::cache`] only mirrors
//! it, and keeps the mirror current by listening to [`StoreEvent`]s, which
//! cover mutations made by this process as well as mutations made elsewhere.
//!
//! # Example
//!
//! ```rust,ignore
//! use credsync_core::store::{CredentialStore, MemoryStore, StoreEvent};
//!
//! let store = MemoryStore::new();
//! let mut events = store.subscribe();
//!
//! store.add(&record).await?;
//! assert!(matches!(events.recv().await?, StoreEvent::Added(_)));
//! ```

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::model::{RawRecord, RecordId};

mod memory;

pub use memory::MemoryStore;

/// Change notification published by a credential store.
///
/// One subscription carries all four notification kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A record was created.
    Added(RawRecord),

    /// A record was modified. Carries the new value.
    Updated(RawRecord),

    /// A record was deleted.
    Removed(RecordId),

    /// Every record was deleted.
    AllRemoved,
}

/// Error type for credential store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record was not found.
    #[error("record not found: {id}")]
    NotFound { id: RecordId },

    /// A record with the same ID already exists.
    #[error("record already exists: {id}")]
    AlreadyExists { id: RecordId },

    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// Reading provider data failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Abstraction over the external credential provider.
///
/// Implementations include:
/// - [`MemoryStore`] - In-memory provider for tests and development
///
/// Mutating calls resolve once the provider has accepted the change. A
/// provider is expected to publish a matching [`StoreEvent`] for every change,
/// whether it came through this trait or from somewhere else.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch every stored record.
    async fn get_all(&self) -> Result<Vec<RawRecord>, StoreError>;

    /// Persist a new record.
    async fn add(&self, record: &RawRecord) -> Result<(), StoreError>;

    /// Replace an existing record.
    async fn update(&self, record: &RawRecord) -> Result<(), StoreError>;

    /// Delete a record by ID.
    async fn remove(&self, id: &RecordId) -> Result<(), StoreError>;

    /// Subscribe to change notifications.
    ///
    /// Each call returns an independent receiver that sees events published
    /// after the call.
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

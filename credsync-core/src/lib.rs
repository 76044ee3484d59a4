//! # credsync Core
//!
//! Core library for keeping an in-memory view of a user's stored credentials
//! in step with an external credential store.
//!
//! This crate provides:
//! - Record types and the display normalization applied to them
//! - The [`CredentialStore`] contract plus an in-memory implementation
//! - [`CredentialCache`], the authoritative mirror every read and write goes through
//! - [`ChangeEvent`]s describing what changed, for fan-out to clients
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use credsync_core::{CredentialCache, MemoryStore, RecordInput, Secret, TracingTelemetry};
//!
//! async fn example() -> Result<(), credsync_core::SyncError> {
//!     let cache = CredentialCache::new(Arc::new(MemoryStore::new()), Arc::new(TracingTelemetry));
//!     cache.load().await?;
//!
//!     let item = cache
//!         .add(RecordInput {
//!             origin: Some("https://www.example.com".to_string()),
//!             password: Some(Secret::new("hunter2")),
//!             ..Default::default()
//!         })
//!         .await?;
//!     assert_eq!(item.title, "example.com");
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod event;
pub mod model;
pub mod normalize;
pub mod store;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use model::{
    NormalizedRecord,
    RawRecord,
    RecordId,
    RecordInput,
    Secret,
};

pub use normalize::{derive_title, normalize};

pub use store::{
    CredentialStore,
    MemoryStore,
    StoreError,
    StoreEvent,
};

pub use cache::CredentialCache;

pub use event::ChangeEvent;

pub use telemetry::{
    EventExtra,
    NoopTelemetry,
    Telemetry,
    TracingTelemetry,
};

pub use error::SyncError;

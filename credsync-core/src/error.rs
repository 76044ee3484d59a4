//! Top-level error types for credsync.

use thiserror::Error;

use crate::model::RecordId;
use crate::store::StoreError;

/// Error returned by credential cache operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Required input was missing or malformed. Caller error, never retried.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The targeted record is not in the cache.
    #[error("no existing item for {id}")]
    NotFound { id: RecordId },

    /// The external credential store rejected or failed the call.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl SyncError {
    /// Build a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Short machine-readable kind, used in error replies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Storage(_) => "storage",
        }
    }
}

//! Non-cache collaborators the hub delegates to.
//!
//! - [`Clipboard`] - receives values clients asked to copy
//! - [`ViewLifecycle`] - tracks client views opening and closing

use async_trait::async_trait;
use credsync_core::Secret;
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Error type for collaborator calls.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// The system clipboard could not be written.
    #[error("clipboard unavailable: {message}")]
    Clipboard { message: String },
}

/// Destination for copied field values.
#[async_trait]
pub trait Clipboard: Send + Sync {
    /// Copy `value`, which came from the record field named `field`.
    async fn copy(&self, field: &str, value: &Secret) -> Result<(), CollaboratorError>;
}

/// Clipboard backed by the operating system clipboard.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

#[async_trait]
impl Clipboard for SystemClipboard {
    async fn copy(&self, field: &str, value: &Secret) -> Result<(), CollaboratorError> {
        let text = Zeroizing::new(value.expose().to_string());

        tokio::task::spawn_blocking(move || -> Result<(), arboard::Error> {
            let mut clipboard = arboard::Clipboard::new()?;
            clipboard.set_text(text.as_str())
        })
        .await
        .map_err(|e| CollaboratorError::Clipboard {
            message: format!("clipboard task failed: {}", e),
        })?
        .map_err(|e| CollaboratorError::Clipboard {
            message: e.to_string(),
        })?;

        debug!(field, "Copied field to system clipboard");
        Ok(())
    }
}

/// Clipboard that only logs which field was copied.
///
/// Used when the system clipboard is disabled, e.g. on headless hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingClipboard;

#[async_trait]
impl Clipboard for LoggingClipboard {
    async fn copy(&self, field: &str, _value: &Secret) -> Result<(), CollaboratorError> {
        info!(field, "Copy requested (system clipboard disabled)");
        Ok(())
    }
}

/// Receiver of client view lifecycle notifications.
#[async_trait]
pub trait ViewLifecycle: Send + Sync {
    /// A view named `name` opened.
    async fn open(&self, name: &str);

    /// A view named `name` closed.
    async fn close(&self, name: &str);
}

/// Counts open views per name.
#[derive(Debug, Default)]
pub struct ViewRegistry {
    open: Mutex<HashMap<String, usize>>,
}

impl ViewRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// How many views named `name` are currently open.
    pub fn open_count(&self, name: &str) -> usize {
        self.open.lock().get(name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ViewLifecycle for ViewRegistry {
    async fn open(&self, name: &str) {
        let mut open = self.open.lock();
        let count = open.entry(name.to_string()).or_insert(0);
        *count += 1;
        info!(view = name, open = *count, "View opened");
    }

    async fn close(&self, name: &str) {
        let mut open = self.open.lock();
        match open.get_mut(name) {
            Some(count) if *count > 1 => {
                *count -= 1;
                info!(view = name, open = *count, "View closed");
            }
            Some(_) => {
                open.remove(name);
                info!(view = name, open = 0, "View closed");
            }
            None => debug!(view = name, "Close for a view that was not open"),
        }
    }
}

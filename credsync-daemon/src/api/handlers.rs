//! Request handlers for the channel protocol.

use credsync_core::{ChangeEvent, CredentialCache, SyncError, Telemetry};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::types::{EmptyResponse, ItemResponse, ItemsResponse, Request};
use crate::collaborators::{
    Clipboard, CollaboratorError, LoggingClipboard, ViewLifecycle, ViewRegistry,
};

/// State shared across request handlers.
#[derive(Clone)]
pub struct ApiState {
    /// The authoritative credential cache
    pub cache: Arc<CredentialCache>,
    /// Sink for client-forwarded telemetry
    pub telemetry: Arc<dyn Telemetry>,
    /// Destination for copied field values
    pub clipboard: Arc<dyn Clipboard>,
    /// Tracker for client views
    pub views: Arc<dyn ViewLifecycle>,
}

impl ApiState {
    /// Create API state with a logging clipboard and a fresh view registry.
    pub fn new(cache: Arc<CredentialCache>, telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            cache,
            telemetry,
            clipboard: Arc::new(LoggingClipboard),
            views: Arc::new(ViewRegistry::new()),
        }
    }

    /// Replace the clipboard collaborator.
    pub fn with_clipboard(mut self, clipboard: Arc<dyn Clipboard>) -> Self {
        self.clipboard = clipboard;
        self
    }

    /// Replace the view lifecycle collaborator.
    pub fn with_views(mut self, views: Arc<dyn ViewLifecycle>) -> Self {
        self.views = views;
        self
    }
}

/// Error produced while handling one request.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The cache rejected or failed the operation.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The request could not be decoded.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] serde_json::Error),

    /// A collaborator failed.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl HandlerError {
    /// Error kind reported to the client.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sync(err) => err.kind(),
            Self::InvalidRequest(_) => "validation",
            Self::Collaborator(_) => "internal",
        }
    }
}

/// Outcome of a successfully handled request.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    /// Reply payload for the requesting channel.
    pub result: Value,
    /// Change to broadcast to the other channels, if the request mutated state.
    pub change: Option<ChangeEvent>,
}

impl Dispatched {
    fn respond(response: impl Serialize) -> Result<Self, HandlerError> {
        Ok(Self {
            result: serde_json::to_value(response)?,
            change: None,
        })
    }

    fn with_change(mut self, change: Option<ChangeEvent>) -> Self {
        self.change = change;
        self
    }
}

/// Decode `message` and run it against the cache or a collaborator.
pub async fn dispatch(state: &ApiState, message: Value) -> Result<Dispatched, HandlerError> {
    let request = Request::parse(message)?;
    debug!(kind = request.kind(), "Dispatching request");

    match request {
        Request::AddItem { item } => {
            let input = item.ok_or_else(|| SyncError::validation("invalid item"))?;
            let item = state.cache.add(input).await?;
            let change = ChangeEvent::AddedItem { item: item.clone() };
            Ok(Dispatched::respond(ItemResponse { item: Some(item) })?.with_change(Some(change)))
        }
        Request::UpdateItem { item } => {
            let input = item.ok_or_else(|| SyncError::validation("invalid item"))?;
            let item = state.cache.update(input).await?;
            let change = ChangeEvent::UpdatedItem { item: item.clone() };
            Ok(Dispatched::respond(ItemResponse { item: Some(item) })?.with_change(Some(change)))
        }
        Request::RemoveItem { id } => {
            let removed = state.cache.remove(&id).await?;
            let change = removed.map(|item| ChangeEvent::RemovedItem {
                id: item.id().clone(),
            });
            Ok(Dispatched::respond(EmptyResponse {})?.with_change(change))
        }
        Request::GetItem { id } => Dispatched::respond(ItemResponse {
            item: state.cache.get(&id),
        }),
        Request::ListItems => Dispatched::respond(ItemsResponse {
            items: state.cache.list(),
        }),
        Request::CopiedField { field, value } => {
            state.clipboard.copy(&field, &value).await?;
            Dispatched::respond(EmptyResponse {})
        }
        Request::TelemetryEvent {
            method,
            object,
            extra,
        } => {
            state.telemetry.record_event(&method, &object, extra).await;
            Dispatched::respond(EmptyResponse {})
        }
        Request::OpenView { name } => {
            state.views.open(&name).await;
            Dispatched::respond(EmptyResponse {})
        }
        Request::CloseView { name } => {
            state.views.close(&name).await;
            Dispatched::respond(EmptyResponse {})
        }
        Request::Unknown => Ok(Dispatched {
            result: Value::Null,
            change: None,
        }),
    }
}

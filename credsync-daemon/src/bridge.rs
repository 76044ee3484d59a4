//! Forwards provider change notifications into the cache and out to clients.

use credsync_core::{ChangeEvent, CredentialCache, StoreEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::hub::ChannelHub;

/// Subscribes to the provider once and keeps the cache in step with it.
pub struct ProviderBridge {
    cache: Arc<CredentialCache>,
    hub: Arc<ChannelHub>,
    started: AtomicBool,
}

impl ProviderBridge {
    pub fn new(cache: Arc<CredentialCache>, hub: Arc<ChannelHub>) -> Self {
        Self {
            cache,
            hub,
            started: AtomicBool::new(false),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Subscribe to the provider and spawn the forwarding task.
    ///
    /// Returns `None` if the bridge was already started. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Provider bridge already started");
            return None;
        }

        let mut events = self.cache.store().subscribe();
        let cache = self.cache.clone();
        let hub = self.hub.clone();

        info!("Provider bridge subscribed");
        Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => forward(&cache, &hub, event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Provider events lagged, resynchronizing");
                        resync(&cache, &hub).await;
                    }
                    Err(RecvError::Closed) => {
                        info!("Provider closed its event stream");
                        break;
                    }
                }
            }
        }))
    }
}

fn forward(cache: &CredentialCache, hub: &ChannelHub, event: StoreEvent) {
    match cache.apply_from_provider(event) {
        Some(change) => {
            hub.broadcast(change, None);
        }
        None => debug!("Provider event left cache unchanged"),
    }
}

async fn resync(cache: &CredentialCache, hub: &ChannelHub) {
    if let Err(err) = cache.load().await {
        warn!(error = %err, "Resynchronization failed");
        return;
    }

    hub.broadcast(ChangeEvent::RemovedAll, None);
    for item in cache.list() {
        hub.broadcast(ChangeEvent::AddedItem { item }, None);
    }
}

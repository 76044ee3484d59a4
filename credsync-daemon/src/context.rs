//! The process-wide synchronization context.

use credsync_core::{CredentialCache, SyncError};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::api::handlers::ApiState;
use crate::bridge::ProviderBridge;
use crate::hub::ChannelHub;

/// Owns the cache, the hub and the provider bridge for one process.
pub struct SyncContext {
    cache: Arc<CredentialCache>,
    hub: Arc<ChannelHub>,
    bridge: ProviderBridge,
    bridge_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncContext {
    /// Build the hub, start the provider bridge and bulk-load the cache.
    ///
    /// The bridge subscribes before the load so changes made while loading
    /// are still applied.
    pub async fn initialize(state: ApiState) -> Result<Self, SyncError> {
        let cache = state.cache.clone();
        let hub = Arc::new(ChannelHub::new(state));
        let bridge = ProviderBridge::new(cache.clone(), hub.clone());
        let bridge_task = bridge.start();

        match cache.load().await {
            Ok(count) => info!(records = count, "Credential cache loaded"),
            Err(err) => {
                if let Some(task) = bridge_task {
                    task.abort();
                }
                return Err(err);
            }
        }

        Ok(Self {
            cache,
            hub,
            bridge,
            bridge_task: Mutex::new(bridge_task),
        })
    }

    pub fn cache(&self) -> &Arc<CredentialCache> {
        &self.cache
    }

    pub fn hub(&self) -> &Arc<ChannelHub> {
        &self.hub
    }

    pub fn bridge(&self) -> &ProviderBridge {
        &self.bridge
    }

    /// Stop the bridge, drop every channel and clear the cache.
    pub fn shutdown(&self) {
        if let Some(task) = self.bridge_task.lock().take() {
            task.abort();
        }
        self.hub.disconnect_all();
        self.cache.clear();
        info!("Synchronization context shut down");
    }
}

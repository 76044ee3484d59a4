//! Channel hub: the set of connected client channels.
//!
//! Each client gets a [`Channel`] from [`ChannelHub::connect`]. Requests from
//! a channel are dispatched through [`ChannelHub::on_message`]; the reply goes
//! back to that channel only, and any resulting change is broadcast to every
//! other connected channel.

use credsync_core::ChangeEvent;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::handlers::{dispatch, ApiState, HandlerError};
use crate::api::types::Outbound;

/// Identifier of one connected channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel-{}", self.0)
    }
}

/// Receiving end of a connected channel.
///
/// Frames stop arriving once the hub disconnects the channel.
#[derive(Debug)]
pub struct Channel {
    id: ChannelId,
    receiver: mpsc::UnboundedReceiver<Outbound>,
}

impl Channel {
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Wait for the next frame. `None` after disconnect once drained.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.receiver.recv().await
    }

    /// Take the next frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Outbound> {
        self.receiver.try_recv().ok()
    }
}

/// Routes client requests and fans out change events.
pub struct ChannelHub {
    state: ApiState,
    channels: Mutex<HashMap<ChannelId, mpsc::UnboundedSender<Outbound>>>,
    next_id: AtomicU64,
}

impl ChannelHub {
    pub fn new(state: ApiState) -> Self {
        Self {
            state,
            channels: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// State shared with the request handlers.
    pub fn state(&self) -> &ApiState {
        &self.state
    }

    /// Register a new channel.
    pub fn connect(&self) -> Channel {
        let id = ChannelId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::unbounded_channel();
        let active = {
            let mut channels = self.channels.lock();
            channels.insert(id, sender);
            channels.len()
        };
        info!(channel = %id, active, "Channel connected");
        Channel { id, receiver }
    }

    /// Remove a channel. No further frames are delivered to it.
    pub fn disconnect(&self, id: ChannelId) {
        let removed = self.channels.lock().remove(&id).is_some();
        if removed {
            info!(channel = %id, active = self.channel_count(), "Channel disconnected");
        } else {
            debug!(channel = %id, "Disconnect for unknown channel");
        }
    }

    /// Drop every channel.
    pub fn disconnect_all(&self) {
        let dropped = {
            let mut channels = self.channels.lock();
            let count = channels.len();
            channels.clear();
            count
        };
        if dropped > 0 {
            info!(dropped, "Disconnected all channels");
        }
    }

    pub fn is_connected(&self, id: ChannelId) -> bool {
        self.channels.lock().contains_key(&id)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    /// Handle one request from `origin`.
    ///
    /// Exactly one reply is sent to `origin`. A successful mutation is then
    /// broadcast to every other channel.
    pub async fn on_message(&self, origin: ChannelId, message: Value) {
        let request_id = message.get("requestId").cloned();

        match dispatch(&self.state, message).await {
            Ok(outcome) => {
                self.send(origin, Outbound::reply(request_id, outcome.result));
                if let Some(change) = outcome.change {
                    self.broadcast(change, Some(origin));
                }
            }
            Err(err) => self.send_error(origin, request_id, &err),
        }
    }

    /// Reply to `origin` with an error description.
    pub fn send_error(&self, origin: ChannelId, request_id: Option<Value>, err: &HandlerError) {
        debug!(channel = %origin, kind = err.kind(), error = %err, "Request failed");
        self.send(origin, Outbound::error(request_id, err.kind(), err.to_string()));
    }

    /// Send `event` to every connected channel except `origin`.
    ///
    /// Returns the number of channels the event was delivered to. Channels
    /// whose receiver is gone are pruned.
    pub fn broadcast(&self, event: ChangeEvent, origin: Option<ChannelId>) -> usize {
        let kind = event.kind();
        let mut delivered = 0;
        let mut channels = self.channels.lock();

        channels.retain(|id, sender| {
            if Some(*id) == origin {
                return true;
            }
            match sender.send(Outbound::Broadcast {
                event: event.clone(),
            }) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => {
                    warn!(channel = %id, "Pruning channel with closed receiver");
                    false
                }
            }
        });

        debug!(event = kind, delivered, "Broadcast change");
        delivered
    }

    fn send(&self, id: ChannelId, frame: Outbound) {
        let mut channels = self.channels.lock();
        let Some(sender) = channels.get(&id) else {
            warn!(channel = %id, "Dropping reply for disconnected channel");
            return;
        };
        if sender.send(frame).is_err() {
            warn!(channel = %id, "Pruning channel with closed receiver");
            channels.remove(&id);
        }
    }
}

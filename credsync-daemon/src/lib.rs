//! Credsync Daemon Library
//!
//! Connects client channels to the credential cache: the channel hub, the
//! provider event bridge, the socket server and configuration. Exposed as a
//! library for testing and for embedding the hub in other processes.

pub mod api;
pub mod bridge;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod hub;

pub use api::{start_server, ApiState, ServerHandle};
pub use bridge::ProviderBridge;
pub use collaborators::{Clipboard, LoggingClipboard, SystemClipboard, ViewLifecycle, ViewRegistry};
pub use config::{load_config, DaemonConfig};
pub use context::SyncContext;
pub use hub::{Channel, ChannelHub, ChannelId};

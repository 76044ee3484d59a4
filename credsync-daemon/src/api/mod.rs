//! Client channel API.
//!
//! Wire types, request dispatch, and the Unix socket server that carries
//! them between clients and the [`ChannelHub`](crate::hub::ChannelHub).

pub mod handlers;
pub mod server;
pub mod types;

pub use handlers::{dispatch, ApiState, Dispatched, HandlerError};
pub use server::{start_server, ServerHandle};
pub use types::*;

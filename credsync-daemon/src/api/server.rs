//! Unix socket server that turns each connection into a hub channel.
//!
//! Frames are newline-delimited JSON in both directions.

use super::handlers::HandlerError;
use crate::hub::{Channel, ChannelHub};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handle to a running socket server
pub struct ServerHandle {
    shutdown: Arc<Mutex<Option<tokio::sync::mpsc::Sender<()>>>>,
    join_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

/// Start serving `hub` on a Unix socket.
///
/// A stale socket file at `socket_path` is replaced. The new socket is
/// readable and writable by the owner only.
pub async fn start_server(socket_path: &Path, hub: Arc<ChannelHub>) -> Result<ServerHandle> {
    if socket_path.exists() {
        warn!("Removing existing socket at {:?}", socket_path);
        std::fs::remove_file(socket_path)
            .with_context(|| format!("Failed to remove existing socket at {:?}", socket_path))?;
    }

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create socket directory {:?}", parent))?;
    }

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("Failed to bind Unix socket at {:?}", socket_path))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to restrict permissions on {:?}", socket_path))?;
    }

    info!("Listening for clients on {:?}", socket_path);

    let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(1);

    let server_task: JoinHandle<()> = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = rx.recv() => {
                    debug!("Server shutdown signal received");
                    break;
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let hub = hub.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, hub).await {
                                    warn!("Connection handler error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }
    });

    Ok(ServerHandle {
        shutdown: Arc::new(Mutex::new(Some(tx))),
        join_handle: Arc::new(Mutex::new(Some(server_task))),
    })
}

/// Serve one client connection as a hub channel.
async fn handle_connection(stream: UnixStream, hub: Arc<ChannelHub>) -> Result<()> {
    let channel = hub.connect();
    let id = channel.id();
    let (reader, writer) = stream.into_split();

    let writer_task = tokio::spawn(write_frames(channel, writer));

    let mut lines = BufReader::new(reader).lines();
    let read_result = loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<serde_json::Value>(&line) {
            Ok(message) => {
                let hub = hub.clone();
                tokio::spawn(async move { hub.on_message(id, message).await });
            }
            Err(e) => hub.send_error(id, None, &HandlerError::InvalidRequest(e)),
        }
    };

    hub.disconnect(id);
    if let Err(e) = writer_task.await? {
        debug!(channel = %id, "Writer stopped: {}", e);
    }

    read_result.with_context(|| format!("Failed to read from {}", id))
}

/// Write every frame queued for `channel` until it is disconnected.
async fn write_frames(mut channel: Channel, mut writer: OwnedWriteHalf) -> Result<()> {
    while let Some(frame) = channel.recv().await {
        let mut json = serde_json::to_string(&frame)?;
        json.push('\n');
        writer.write_all(json.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

impl ServerHandle {
    /// Stop accepting connections.
    pub async fn stop(&self) -> Result<()> {
        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(()).await;
        }

        if let Some(handle) = self.join_handle.lock().await.take() {
            // If the task panicked, surface the error
            handle.await?;
        }

        Ok(())
    }
}

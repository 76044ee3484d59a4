//! Credsync Daemon
//!
//! Background service that owns the credential cache and keeps every
//! connected client view in step with it.
//!
//! # Running
//!
//! ```bash
//! cargo run -p credsync-daemon -- --config ./daemon.toml
//! # or after install:
//! credsyncd
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use credsync_core::{CredentialCache, MemoryStore, TracingTelemetry};
use credsync_daemon::collaborators::{Clipboard, LoggingClipboard, SystemClipboard};
use credsync_daemon::{load_config, start_server, ApiState, DaemonConfig, SyncContext};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "credsyncd", version, about = "Credential synchronization daemon")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the socket path from the configuration
    #[arg(short, long)]
    socket: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(socket) = args.socket {
        config.socket_path = socket;
    }

    init_logging(&config.log_level);
    info!("Loaded configuration from {:?}", config.config_path);

    run_daemon(config).await
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run_daemon(config: DaemonConfig) -> Result<()> {
    let store = match &config.seed_file {
        Some(path) => MemoryStore::from_json_file(path, config.event_buffer)
            .with_context(|| format!("Failed to seed provider from {:?}", path))?,
        None => MemoryStore::with_capacity(config.event_buffer),
    };

    let telemetry = Arc::new(TracingTelemetry);
    let cache = Arc::new(CredentialCache::new(Arc::new(store), telemetry.clone()));

    let clipboard: Arc<dyn Clipboard> = if config.system_clipboard {
        Arc::new(SystemClipboard)
    } else {
        Arc::new(LoggingClipboard)
    };
    let state = ApiState::new(cache, telemetry).with_clipboard(clipboard);

    let context = SyncContext::initialize(state)
        .await
        .context("Failed to initialize credential cache")?;

    let server_handle = start_server(&config.socket_path, context.hub().clone()).await?;

    info!("Daemon running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping server...");

    server_handle.stop().await?;
    context.shutdown();

    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
        info!("Socket file removed");
    }

    info!("Daemon stopped");
    Ok(())
}

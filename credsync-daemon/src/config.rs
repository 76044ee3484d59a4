//! Daemon configuration handling.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Path to the Unix socket clients connect to.
    pub socket_path: PathBuf,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Logging level, used when `RUST_LOG` is unset.
    pub log_level: String,

    /// JSON array of records to seed the in-memory provider with.
    pub seed_file: Option<PathBuf>,

    /// Capacity of the provider event subscription.
    pub event_buffer: usize,

    /// Write copied fields to the system clipboard.
    pub system_clipboard: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let socket_path = project_dirs()
            .map(|d| d.runtime_dir().unwrap_or(d.data_dir()).join("credsync.sock"))
            .unwrap_or_else(|| PathBuf::from("/tmp/credsync.sock"));

        Self {
            socket_path,
            config_path: PathBuf::new(),
            log_level: "info".to_string(),
            seed_file: None,
            event_buffer: 256,
            system_clipboard: true,
        }
    }
}

/// Load configuration from `path`, or from the default location.
///
/// A missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<DaemonConfig> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path(),
    };

    let mut config = if config_path.exists() {
        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", config_path))?
    } else {
        DaemonConfig::default()
    };

    config.config_path = config_path;
    Ok(config)
}

fn default_config_path() -> PathBuf {
    project_dirs()
        .map(|d| d.config_dir().join("daemon.toml"))
        .unwrap_or_else(|| PathBuf::from("credsync-daemon.toml"))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "credsync", "credsync")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daemon.toml");

        let config = load_config(Some(path.as_path())).unwrap();
        assert_eq!(config.config_path, path);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.event_buffer, 256);
        assert!(config.system_clipboard);
        assert!(config.seed_file.is_none());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daemon.toml");
        std::fs::write(
            &path,
            "socket_path = \"/run/user/1000/cs.sock\"\nsystem_clipboard = false\nseed_file = \"seed.json\"\n",
        )
        .unwrap();

        let config = load_config(Some(path.as_path())).unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/run/user/1000/cs.sock"));
        assert!(!config.system_clipboard);
        assert_eq!(config.seed_file, Some(PathBuf::from("seed.json")));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.event_buffer, 256);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daemon.toml");
        std::fs::write(&path, "event_buffer = \"lots\"").unwrap();

        assert!(load_config(Some(path.as_path())).is_err());
    }
}

use crate::utils::get_data_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.json";

/// Console configuration: where the appliance lives and how to talk to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Base URL of the appliance, e.g. `http://10.0.0.1:4444`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Bearer token sent with every request, if set
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Append apply/enable/disable events to the audit log
    #[serde(default = "default_true")]
    pub audit_log: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_token: None,
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_request_timeout(),
            audit_log: true,
        }
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:4444".to_string()
}

fn default_connect_timeout() -> u64 {
    2_000
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

/// Location of the config file, if a data directory is available
pub fn config_path() -> Option<PathBuf> {
    get_data_dir().map(|dir| dir.join(CONFIG_FILE))
}

/// Saves the config to the data directory.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be written or renamed into place.
pub async fn save_config(config: &ConsoleConfig) -> std::io::Result<()> {
    match config_path() {
        Some(path) => save_config_to(&path, config).await,
        None => Ok(()),
    }
}

/// Writes the config to `path` atomically.
///
/// 1. Writes to `<path>.tmp`, created with mode 0o600 on Unix (the file may
///    hold an API token).
/// 2. Syncs it to disk.
/// 3. Renames it over `path`.
///
/// # Errors
///
/// Returns an I/O error if any step fails; `path` is left untouched then.
pub async fn save_config_to(path: &Path, config: &ConsoleConfig) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let json = serde_json::to_string_pretty(config)?;
    let temp_path = path.with_extension("json.tmp");

    #[cfg(unix)]
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o600)
        .open(&temp_path)
        .await?;

    #[cfg(not(unix))]
    let mut file = tokio::fs::File::create(&temp_path).await?;

    file.write_all(json.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&temp_path, path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::StorageFull {
            std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "Disk full: cannot save configuration. Free up space and try again.",
            )
        } else {
            e
        }
    })
}

/// Loads the config from the data directory, or returns defaults.
pub async fn load_config() -> ConsoleConfig {
    match config_path() {
        Some(path) => load_config_from(&path).await,
        None => ConsoleConfig::default(),
    }
}

/// Loads the config from `path`. A missing or unreadable file yields defaults.
pub async fn load_config_from(path: &Path) -> ConsoleConfig {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
            tracing::warn!("Ignoring corrupt config {}: {e}", path.display());
            ConsoleConfig::default()
        }),
        Err(_) => ConsoleConfig::default(),
    }
}

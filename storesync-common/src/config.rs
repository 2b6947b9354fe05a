//! Configuration file loading
//!
//! The TOML file is optional. A missing file is not an error: the service
//! logs a warning and starts with compiled defaults. Each value can still be
//! overridden from the command line or environment by the binary.
//!
//! Config file resolution order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/storesync/config.toml`)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an alternative config file
pub const CONFIG_PATH_ENV: &str = "STORESYNC_CONFIG";

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    pub progress: ProgressConfig,
    pub gc: GcConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5730".to_string(),
        }
    }
}

/// Remote record store connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// API root, without trailing slash
    pub base_url: String,
    /// Base (workspace) identifier
    pub base_id: Option<String>,
    /// Table holding the per-store records
    pub table: String,
    /// API token; prefer the environment variable over storing it here
    pub api_key: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.airtable.com/v0".to_string(),
            base_id: None,
            table: "Tiendas".to_string(),
            api_key: None,
        }
    }
}

/// Batch dispatch pacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Records per create/update request (the remote accepts at most 10)
    pub batch_size: usize,
    /// Pause between consecutive batches
    pub pacing_ms: u64,
    /// Pause after a failed batch
    pub error_backoff_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            pacing_ms: 200,
            error_backoff_ms: 1000,
        }
    }
}

/// Progress stream settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub heartbeat_secs: u64,
    /// Event bus capacity before slow subscribers lag
    pub channel_capacity: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: 15,
            channel_capacity: 256,
        }
    }
}

/// Session garbage collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    pub interval_secs: u64,
    pub in_progress_ttl_secs: u64,
    pub completed_ttl_secs: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            in_progress_ttl_secs: 30 * 60,
            completed_ttl_secs: 2 * 60 * 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Platform default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("storesync").join("config.toml"))
}

/// Pick the config file to read, if any
///
/// CLI and environment paths are returned even if they do not exist so the
/// caller can warn about them; the platform default is only returned when
/// present.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path().filter(|p| p.exists())
}

/// Parse a config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    Ok(config)
}

/// Where a loaded config came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from this file
    File(PathBuf),
    /// This path was requested but does not exist; defaults were used
    Missing(PathBuf),
    /// No file was configured; defaults were used
    Defaults,
}

impl ConfigSource {
    /// Report the source; called once logging is up
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => info!("Loaded config from {}", path.display()),
            ConfigSource::Missing(path) => {
                warn!("Config file {} not found, using defaults", path.display())
            }
            ConfigSource::Defaults => info!("No config file found, using defaults"),
        }
    }
}

/// Load the resolved config file, falling back to defaults when it is missing
///
/// A file that exists but does not parse is an error. Nothing is logged here
/// since the caller usually has no subscriber yet; see [`ConfigSource::log`].
pub fn load_or_default(path: Option<&Path>) -> Result<(TomlConfig, ConfigSource)> {
    let Some(path) = path else {
        return Ok((TomlConfig::default(), ConfigSource::Defaults));
    };

    if !path.exists() {
        return Ok((
            TomlConfig::default(),
            ConfigSource::Missing(path.to_path_buf()),
        ));
    }

    let config = load_toml_config(path)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    Ok((config, ConfigSource::File(path.to_path_buf())))
}

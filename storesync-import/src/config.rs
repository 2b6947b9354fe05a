//! Configuration resolution for storesync-import
//!
//! Remote credentials resolve with ENV → TOML priority. Everything else comes
//! from the TOML file (or its defaults) after the binary has applied its
//! command-line overrides.

use std::time::Duration;

use storesync_common::config::{RemoteConfig, TomlConfig};
use storesync_common::{Error, Result};
use tracing::{info, warn};

use crate::services::batch_dispatcher::DispatchSettings;
use crate::services::session_gc::GcPolicy;

/// Environment variable holding the remote API token
pub const API_KEY_ENV: &str = "STORESYNC_REMOTE_API_KEY";

/// Environment variable holding the remote base id
pub const BASE_ID_ENV: &str = "STORESYNC_REMOTE_BASE_ID";

/// Everything needed to reach the remote table
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCredentials {
    pub api_key: String,
    pub base_id: String,
}

/// Runtime settings derived from [`TomlConfig`]
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub bind: String,
    pub dispatch: DispatchSettings,
    pub heartbeat: Duration,
    pub channel_capacity: usize,
    pub gc_policy: GcPolicy,
    pub gc_interval: Duration,
}

impl ServiceSettings {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            bind: config.server.bind.clone(),
            dispatch: DispatchSettings::from_config(&config.sync),
            heartbeat: Duration::from_secs(config.progress.heartbeat_secs.max(1)),
            channel_capacity: config.progress.channel_capacity.max(1),
            gc_policy: GcPolicy::from_config(&config.gc),
            gc_interval: Duration::from_secs(config.gc.interval_secs.max(1)),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from_config(&TomlConfig::default())
    }
}

/// Resolve one secret-ish value: environment first, then TOML
///
/// Logs which source won and warns when both are set.
fn resolve_value(label: &str, env_var: &str, toml_value: Option<&String>) -> Option<String> {
    let env_value = std::env::var(env_var).ok().filter(|v| is_valid_value(v));
    let toml_value = toml_value.filter(|v| is_valid_value(v));

    if env_value.is_some() && toml_value.is_some() {
        warn!(
            "{} found in multiple sources: environment, TOML. Using environment (highest priority).",
            label
        );
    }

    if let Some(value) = env_value {
        info!("{} loaded from environment variable", label);
        return Some(value);
    }

    if let Some(value) = toml_value {
        info!("{} loaded from TOML config", label);
        return Some(value.clone());
    }

    None
}

/// Resolve the remote API token and base id
///
/// **Priority:** ENV → TOML
pub fn resolve_remote_credentials(remote: &RemoteConfig) -> Result<RemoteCredentials> {
    let api_key = resolve_value("Remote API key", API_KEY_ENV, remote.api_key.as_ref());
    let base_id = resolve_value("Remote base id", BASE_ID_ENV, remote.base_id.as_ref());

    match (api_key, base_id) {
        (Some(api_key), Some(base_id)) => Ok(RemoteCredentials { api_key, base_id }),
        (api_key, base_id) => {
            let mut missing = Vec::new();
            if api_key.is_none() {
                missing.push(format!("API key ({} or [remote] api_key)", API_KEY_ENV));
            }
            if base_id.is_none() {
                missing.push(format!("base id ({} or [remote] base_id)", BASE_ID_ENV));
            }
            Err(Error::Config(format!(
                "Remote store credentials not configured: missing {}",
                missing.join(", ")
            )))
        }
    }
}

/// Validate a configured value (non-empty, non-whitespace)
pub fn is_valid_value(value: &str) -> bool {
    !value.trim().is_empty()
}

//! Test Helper Utilities
//!
//! Shared utilities for testing storesync-import
#![allow(dead_code)]

pub mod fake_remote;

pub use fake_remote::FakeRemoteStore;

use std::sync::Arc;
use std::time::Duration;

use storesync_common::events::EventBus;
use storesync_import::config::ServiceSettings;
use storesync_import::models::{FieldMap, FieldValue, RawRecord};
use storesync_import::services::batch_dispatcher::DispatchSettings;
use storesync_import::services::remote_store::RemoteStore;
use storesync_import::AppState;

/// Dispatch without pacing pauses
pub fn fast_dispatch() -> DispatchSettings {
    DispatchSettings {
        batch_size: 10,
        pacing: Duration::ZERO,
        error_backoff: Duration::ZERO,
    }
}

/// Service settings with fast dispatch and a short heartbeat
pub fn test_settings() -> ServiceSettings {
    ServiceSettings {
        dispatch: fast_dispatch(),
        heartbeat: Duration::from_millis(50),
        ..ServiceSettings::default()
    }
}

/// App state over the in-memory progress store
pub fn test_app_state(remote: Option<Arc<dyn RemoteStore>>) -> AppState {
    AppState::new(EventBus::new(256), remote, test_settings())
}

/// Raw rows from JSON objects
pub fn rows(values: Vec<serde_json::Value>) -> Vec<RawRecord> {
    values
        .into_iter()
        .map(|v| serde_json::from_value(v).expect("row must be a JSON object"))
        .collect()
}

/// Remote field map from (name, value) pairs
pub fn fields(pairs: &[(&str, FieldValue)]) -> FieldMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

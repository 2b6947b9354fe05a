//! storesync-import library interface
//!
//! Spreadsheet import service: normalizes uploaded store-metrics rows, diffs
//! them against the remote table and sends batched creates and updates,
//! streaming per-session progress to clients over SSE.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use storesync_common::events::EventBus;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServiceSettings;
use crate::services::progress_store::{InMemoryProgressStore, ProgressStore};
use crate::services::remote_store::RemoteStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Per-session progress; publishes every write on `event_bus`
    pub progress: Arc<dyn ProgressStore>,
    /// Event bus feeding the progress streams
    pub event_bus: EventBus,
    /// Remote table client, `None` when credentials are missing
    pub remote: Option<Arc<dyn RemoteStore>>,
    pub settings: ServiceSettings,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// State over the default in-memory progress store
    pub fn new(
        event_bus: EventBus,
        remote: Option<Arc<dyn RemoteStore>>,
        settings: ServiceSettings,
    ) -> Self {
        let progress = Arc::new(InMemoryProgressStore::new(event_bus.clone()));
        Self::with_progress_store(progress, event_bus, remote, settings)
    }

    /// State over a caller-supplied progress store
    ///
    /// The store must publish its writes on `event_bus`.
    pub fn with_progress_store(
        progress: Arc<dyn ProgressStore>,
        event_bus: EventBus,
        remote: Option<Arc<dyn RemoteStore>>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            progress,
            event_bus,
            remote,
            settings,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::import_routes())
        .merge(api::progress_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

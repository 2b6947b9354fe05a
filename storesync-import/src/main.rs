//! storesync-import - Store metrics import service
//!
//! Accepts spreadsheet rows over HTTP, syncs them into the remote store
//! table and streams per-session progress over SSE.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storesync_common::config::{load_or_default, resolve_config_path, CONFIG_PATH_ENV};
use storesync_common::events::EventBus;
use storesync_import::config::{resolve_remote_credentials, ServiceSettings};
use storesync_import::services::remote_store::{HttpRemoteStore, RemoteStore};
use storesync_import::services::session_gc::SessionGc;
use storesync_import::AppState;

/// Command-line arguments for storesync-import
#[derive(Parser, Debug)]
#[command(name = "storesync-import")]
#[command(about = "Store metrics spreadsheet import service")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Listen address, overrides `[server] bind`
    #[arg(short, long, env = "STORESYNC_BIND")]
    bind: Option<String>,

    /// Log filter used when RUST_LOG is unset, overrides `[logging] level`
    #[arg(long, env = "STORESYNC_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing exists so its level can seed the filter
    let config_path = resolve_config_path(args.config.as_deref());
    let (mut toml_config, config_source) = load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        toml_config.server.bind = bind;
    }

    let default_filter = args
        .log_level
        .clone()
        .unwrap_or_else(|| toml_config.logging.level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting storesync-import (Store Metrics Import) service");
    info!(
        "Build: {} ({}) built {} [{}]",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    config_source.log();

    let settings = ServiceSettings::from_config(&toml_config);

    let remote: Option<Arc<dyn RemoteStore>> =
        match resolve_remote_credentials(&toml_config.remote) {
            Ok(credentials) => {
                let store = HttpRemoteStore::new(
                    &toml_config.remote.base_url,
                    &credentials.base_id,
                    &toml_config.remote.table,
                    credentials.api_key,
                )
                .context("Failed to create remote store client")?;
                info!(
                    "Remote store: {} (table: {})",
                    toml_config.remote.base_url, toml_config.remote.table
                );
                Some(Arc::new(store) as Arc<dyn RemoteStore>)
            }
            Err(e) => {
                warn!("{}. Imports will fail until credentials are configured.", e);
                None
            }
        };

    let event_bus = EventBus::new(settings.channel_capacity);
    info!("Event bus initialized (capacity: {})", event_bus.capacity());

    let state = AppState::new(event_bus.clone(), remote, settings.clone());
    if state.remote.is_none() {
        *state.last_error.write().await =
            Some("Remote store credentials not configured".to_string());
    }

    let gc = SessionGc::new(
        state.progress.clone(),
        event_bus,
        settings.gc_policy,
        settings.gc_interval,
    )
    .spawn();

    let app = storesync_import::build_router(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", settings.bind))?;
    info!("Listening on http://{}", settings.bind);
    info!("Health check: http://{}/health", settings.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    gc.abort();
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

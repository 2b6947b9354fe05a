//! Import trigger
//!
//! POST /api/import runs a whole import and answers once it has finished.

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use storesync_common::events::ProgressUpdate;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::{API_KEY_ENV, BASE_ID_ENV};
use crate::error::{ApiError, ApiResult};
use crate::models::{FieldMapping, ImportSummary, RawRecord, BUSINESS_KEY};
use crate::services::import_orchestrator::{fail_session, ImportOrchestrator};
use crate::AppState;

/// POST /api/import request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    /// Spreadsheet rows, column name → cell value
    pub records: Vec<RawRecord>,
    /// Spreadsheet column → canonical field name; empty keeps column names
    #[serde(default)]
    pub mapping: FieldMapping,
    /// Client-chosen session id, so the progress stream can be opened
    /// before this request returns
    #[serde(default)]
    pub session_id: Option<String>,
}

/// POST /api/import
///
/// Runs normalization, diff and dispatch for the uploaded rows and returns
/// the final counts. Row and batch failures are reported in `errors`; only
/// bad requests and missing remote credentials fail the request itself.
pub async fn run_import(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> ApiResult<Json<ImportSummary>> {
    if !request.mapping.0.is_empty() && !request.mapping.maps_business_key() {
        return Err(ApiError::BadRequest(format!(
            "Field mapping must map a column to the store number ({})",
            BUSINESS_KEY
        )));
    }

    let session_id = match request.session_id {
        Some(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => Uuid::new_v4().to_string(),
    };

    let claimed = state
        .progress
        .create(
            &session_id,
            ProgressUpdate {
                message: Some(format!("Received {} rows", request.records.len())),
                ..ProgressUpdate::default()
            },
        )
        .await;
    match claimed {
        Ok(_) => {}
        Err(storesync_common::Error::SessionExists(id)) => {
            return Err(ApiError::Conflict(format!(
                "Import session {} already exists",
                id
            )));
        }
        Err(e) => return Err(e.into()),
    }

    let Some(remote) = state.remote.clone() else {
        let message = format!(
            "Remote store is not configured: set {} and {}",
            API_KEY_ENV, BASE_ID_ENV
        );
        error!(session_id = %session_id, "{}", message);
        *state.last_error.write().await = Some(message.clone());
        fail_session(state.progress.as_ref(), &session_id, vec![message.clone()]).await;
        return Err(ApiError::Config(message));
    };

    info!(
        session_id = %session_id,
        rows = request.records.len(),
        "Import requested"
    );

    let orchestrator = ImportOrchestrator::new(
        state.progress.clone(),
        remote,
        state.settings.dispatch.clone(),
    );
    let summary = orchestrator
        .run(&session_id, &request.records, &request.mapping)
        .await;

    if !summary.success {
        *state.last_error.write().await = summary.errors.last().cloned();
    }

    Ok(Json(summary))
}

/// Build import routes
pub fn import_routes() -> Router<AppState> {
    Router::new().route("/api/import", post(run_import))
}

//! Connection status stream
//!
//! GET /events: heartbeat-only SSE used by UIs to show whether the service
//! is reachable. Import progress has its own per-session stream.

use axum::{extract::State, response::IntoResponse};
use storesync_common::sse::{create_heartbeat_sse_stream, streaming_headers};

use crate::AppState;

/// GET /events
pub async fn event_stream(State(state): State<AppState>) -> impl IntoResponse {
    (
        streaming_headers(),
        create_heartbeat_sse_stream("storesync-import", state.settings.heartbeat),
    )
}

//! Import progress endpoints
//!
//! GET /api/import/progress streams a session's progress over SSE;
//! GET /api/import/status returns the current record for polling clients.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::{
        sse::{Event, Sse},
        IntoResponse,
    },
    routing::get,
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use storesync_common::events::{ProgressRecord, SyncEvent};
use storesync_common::sse::streaming_headers;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::services::progress_store::ProgressStore;
use crate::AppState;

/// Query string shared by the progress endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    pub session_id: String,
}

impl SessionQuery {
    fn validated(self) -> ApiResult<String> {
        let id = self.session_id.trim();
        if id.is_empty() {
            return Err(ApiError::BadRequest("sessionId must not be empty".to_string()));
        }
        Ok(id.to_string())
    }
}

/// One item of a session's progress stream
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressFrame {
    /// Progress record, sent only when it differs from the previous one
    Snapshot(ProgressRecord),
    /// Keep-alive comment
    Heartbeat,
    /// Last frame; the stream ends after it
    Closing,
}

impl ProgressFrame {
    fn into_event(self) -> Event {
        match self {
            ProgressFrame::Snapshot(record) => match Event::default().json_data(&record) {
                Ok(event) => event,
                Err(e) => {
                    warn!("SSE: Failed to serialize progress record: {}", e);
                    Event::default().comment("serialization error")
                }
            },
            ProgressFrame::Heartbeat => Event::default().comment("heartbeat"),
            ProgressFrame::Closing => Event::default().event("closing").data("closing"),
        }
    }
}

enum Step {
    Heartbeat,
    Record(Option<ProgressRecord>),
    Evicted,
    Ignore,
    BusClosed,
}

/// Logs when a stream is dropped, whether it finished or the client left
struct StreamGuard {
    session_id: String,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        debug!(session_id = %self.session_id, "SSE: Progress stream closed");
    }
}

/// Progress frames for one session
///
/// `rx` must be subscribed before the stream is first polled: the stream
/// reads the store once on start and relies on the bus for every later
/// write. Records with a write counter (`seq`) at or below the newest one
/// seen are dropped, identical ones are deduplicated. On completion (or
/// eviction) the stream sends a final [`ProgressFrame::Closing`] and ends.
pub fn progress_frames(
    store: Arc<dyn ProgressStore>,
    mut rx: broadcast::Receiver<SyncEvent>,
    session_id: String,
    heartbeat: Duration,
) -> impl Stream<Item = ProgressFrame> {
    async_stream::stream! {
        let _guard = StreamGuard { session_id: session_id.clone() };

        let initial = store.read(&session_id).await;
        let mut newest = initial.as_ref().map(|r| r.seq);
        let initial = initial.unwrap_or_else(ProgressRecord::waiting);
        let done = initial.completed;
        let mut last_sent = initial.clone();
        yield ProgressFrame::Snapshot(initial);
        if done {
            yield ProgressFrame::Closing;
            return;
        }

        let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let step = tokio::select! {
                _ = ticker.tick() => Step::Heartbeat,
                received = rx.recv() => match received {
                    Ok(SyncEvent::ProgressUpdated { session_id: id, progress })
                        if id == session_id =>
                    {
                        Step::Record(Some(progress))
                    }
                    Ok(SyncEvent::SessionEvicted { session_id: id, .. }) if id == session_id => {
                        Step::Evicted
                    }
                    Ok(_) => Step::Ignore,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            session_id = %session_id,
                            skipped,
                            "SSE: Progress subscriber lagged, re-reading store"
                        );
                        Step::Record(store.read(&session_id).await)
                    }
                    Err(RecvError::Closed) => Step::BusClosed,
                },
            };

            match step {
                Step::Heartbeat => yield ProgressFrame::Heartbeat,
                Step::Record(Some(record)) => {
                    let seen = newest.is_some_and(|seq| record.seq <= seq);
                    if seen || record == last_sent {
                        continue;
                    }
                    newest = Some(record.seq);
                    let completed = record.completed;
                    last_sent = record.clone();
                    yield ProgressFrame::Snapshot(record);
                    if completed {
                        yield ProgressFrame::Closing;
                        break;
                    }
                }
                Step::Record(None) | Step::Ignore => {}
                Step::Evicted => {
                    yield ProgressFrame::Closing;
                    break;
                }
                Step::BusClosed => break,
            }
        }
    }
}

/// GET /api/import/progress?sessionId=…
///
/// SSE stream of `data: <ProgressRecord json>` frames, heartbeat comments
/// and a final `closing` event once the import completes.
pub async fn progress_stream(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> ApiResult<impl IntoResponse> {
    let session_id = query.validated()?;
    info!(session_id = %session_id, "New SSE client connected to import progress");

    // Subscribe before the stream's first read so no write is missed
    let rx = state.event_bus.subscribe();
    let events = progress_frames(
        state.progress.clone(),
        rx,
        session_id,
        state.settings.heartbeat,
    )
    .map(|frame| Ok::<_, Infallible>(frame.into_event()));

    Ok((streaming_headers(), Sse::new(events)))
}

/// GET /api/import/status?sessionId=…
///
/// Unknown sessions get the zeroed waiting record rather than 404.
pub async fn import_status(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> ApiResult<Json<ProgressRecord>> {
    let session_id = query.validated()?;
    let record = state
        .progress
        .read(&session_id)
        .await
        .unwrap_or_else(ProgressRecord::waiting);
    Ok(Json(record))
}

/// Build progress routes
pub fn progress_routes() -> Router<AppState> {
    Router::new()
        .route("/api/import/progress", get(progress_stream))
        .route("/api/import/status", get(import_status))
}

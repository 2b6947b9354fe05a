//! Server-Sent Events (SSE) utilities
//!
//! Shared SSE pieces for storesync services.

use axum::http::{header, HeaderName, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info};

/// Header disabling response buffering in nginx-style reverse proxies
pub const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Headers every long-lived SSE response carries
///
/// Caching is disabled and proxies are told not to buffer.
pub fn streaming_headers() -> [(HeaderName, HeaderValue); 2] {
    [
        (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        (X_ACCEL_BUFFERING, HeaderValue::from_static("no")),
    ]
}

/// Create a simple heartbeat-only SSE stream for connection status monitoring
///
/// Used by the UI's connection indicator; carries no domain events.
///
/// # Arguments
/// * `service_name` - Name of the service for logging (e.g., "storesync-import")
/// * `interval` - Time between heartbeats
pub fn create_heartbeat_sse_stream(
    service_name: &'static str,
    interval: Duration,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {} general events", service_name);

    let stream = async_stream::stream! {
        info!("SSE: {} event stream started", service_name);

        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            tokio::time::sleep(interval).await;
            debug!("SSE: Sending heartbeat");
            yield Ok(Event::default().comment("heartbeat"));
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(interval).text("heartbeat"))
}

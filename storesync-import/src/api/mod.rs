//! HTTP API handlers for storesync-import
//!
//! REST for the import trigger and status poll, SSE for progress and
//! connection status.

pub mod health;
pub mod import;
pub mod progress;
pub mod sse;

pub use health::health_routes;
pub use import::import_routes;
pub use progress::progress_routes;
pub use sse::event_stream;

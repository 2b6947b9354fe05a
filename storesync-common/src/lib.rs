//! # storesync Common Library
//!
//! Shared code for storesync crates including:
//! - Progress types and the event bus (EventBus, SyncEvent)
//! - Configuration file loading
//! - SSE helpers
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};

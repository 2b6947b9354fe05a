//! Common error types for storesync

use thiserror::Error;

/// Common result type for storesync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across storesync crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse failure
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// An import session with this id already exists
    #[error("Import session {0} already exists")]
    SessionExists(String),
}

//! Error types for the dirsync core crate.

use thiserror::Error;

/// Top-level error type for all dirsync operations.
#[derive(Debug, Error)]
pub enum DirsyncError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("input error: {0}")]
    Input(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote API error: {0}")]
    Remote(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("sync error: {0}")]
    Sync(String),
}

/// A convenience Result alias that defaults to [`DirsyncError`].
pub type Result<T> = std::result::Result<T, DirsyncError>;

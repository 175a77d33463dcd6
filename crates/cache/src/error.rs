//! Remote cache error types.

use thiserror::Error;

/// Remote cache operation errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache service is not available: {0}")]
    Unavailable(String),

    #[error("paths mismatch in cache {key}")]
    PathMismatch { key: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("cache service error ({status}): {message}")]
    Service { status: u16, message: String },

    #[error("archive error: {0}")]
    Archive(String),

    #[error("background task failed: {0}")]
    Task(String),
}

/// Result type for remote cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

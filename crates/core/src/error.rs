//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid narinfo id: {0}")]
    InvalidNarInfoId(String),

    #[error("invalid nar path: {0}")]
    InvalidNarPath(String),

    #[error("invalid payload url: {0}")]
    InvalidPayloadUrl(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

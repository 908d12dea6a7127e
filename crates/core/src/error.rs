//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for guided audio
#[derive(Error, Debug)]
pub enum Error {
    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors raised by a text-to-speech capability
#[derive(Error, Debug, Clone)]
pub enum SynthesisError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("Invalid audio returned: {0}")]
    InvalidAudio(String),

    #[error("Empty text")]
    EmptyText,

    #[error("Cancelled")]
    Cancelled,
}

/// Errors raised by a storage capability
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Invalid asset id: {0}")]
    InvalidId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

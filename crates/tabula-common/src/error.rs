//! Error types shared across Tabula crates

use thiserror::Error;

/// Result type alias for Tabula operations
pub type Result<T> = std::result::Result<T, TabulaError>;

/// Errors that are meaningful outside a single crate
#[derive(Error, Debug)]
pub enum TabulaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl TabulaError {
    /// Errors caused by the caller's input rather than by the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TabulaError::UnsupportedFormat(_) | TabulaError::MalformedInput(_)
        )
    }
}

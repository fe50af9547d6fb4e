//! Core error types

use thiserror::Error;

/// Core error type for SwarmLink
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Envelope could not be serialized
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for core operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;

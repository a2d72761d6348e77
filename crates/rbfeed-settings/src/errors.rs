//! Settings error types.

use rbfeed_core::FeedError;
use thiserror::Error;

/// Errors that can occur when loading settings or resolving the connection.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read a file from disk.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// No explicit values and nothing discoverable.
    #[error("configuration not found: {0}")]
    ConfigNotFound(String),
    /// The stored credential could not be decoded.
    #[error("invalid stored credential: {0}")]
    InvalidCredential(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

impl From<SettingsError> for FeedError {
    fn from(e: SettingsError) -> Self {
        FeedError::ConfigNotFound(e.to_string())
    }
}

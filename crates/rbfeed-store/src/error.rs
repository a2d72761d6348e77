use std::path::PathBuf;

use rbfeed_core::FeedError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("database not found at: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to decrypt database at {}: invalid password?", .0.display())]
    AuthenticationFailed(PathBuf),

    #[error("store is not open")]
    NotOpen,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<StoreError> for FeedError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Database(msg) => FeedError::QueryFailed(msg),
            StoreError::NotFound(path) => FeedError::NotFound(path),
            StoreError::AuthenticationFailed(path) => FeedError::AuthenticationFailed(path),
            StoreError::NotOpen => FeedError::NotOpen,
        }
    }
}

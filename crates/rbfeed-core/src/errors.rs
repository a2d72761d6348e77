use std::path::PathBuf;

/// Error taxonomy for the history feed.
/// Startup errors stop `start()`; poll errors are reported and polling continues.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    // Startup
    #[error("database not found at: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to decrypt database at {}: invalid password?", .0.display())]
    AuthenticationFailed(PathBuf),
    #[error("configuration not found: {0}")]
    ConfigNotFound(String),
    #[error("no tokio runtime available to schedule polling")]
    NoRuntime,

    // Poll cycle
    #[error("query failed: {0}")]
    QueryFailed(String),
    #[error("poll failed: {0}")]
    TransientPoll(String),
    #[error("store is not open")]
    NotOpen,
}

impl FeedError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::ConfigNotFound(_) => "config_not_found",
            Self::NoRuntime => "no_runtime",
            Self::QueryFailed(_) => "query_failed",
            Self::TransientPoll(_) => "transient_poll",
            Self::NotOpen => "not_open",
        }
    }
}

//! Recognised feed options.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Options for the history feed. Every field has a default, so an empty
/// JSON object is a valid settings file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FeedSettings {
    /// Database path; read from the agent's options.json when absent.
    pub db_path: Option<PathBuf>,
    /// Database password; decrypted from options.json when absent.
    pub db_password: Option<String>,
    pub poll_interval_ms: u64,
    /// Catalog page size for track loads.
    pub max_rows: u32,
    /// Maximum new history rows delivered per poll.
    pub history_max_rows: u32,
    /// Emit a `tracks` signal right after `ready`.
    pub emit_tracks: bool,
    /// DANGEROUS: open the database writable and allow pop/push of history.
    pub dangerously_modify_history: bool,
    /// Buffer size of the signal broadcast channel.
    pub channel_capacity: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            db_path: None,
            db_password: None,
            poll_interval_ms: 2000,
            max_rows: 5000,
            history_max_rows: 100,
            emit_tracks: false,
            dangerously_modify_history: false,
            channel_capacity: 1024,
        }
    }
}

impl FeedSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

use std::path::PathBuf;

use serde::{Serialize, Serializer};

use crate::errors::FeedError;
use crate::history::{PollResult, TracksPayload};

/// Payload of the `ready` signal.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReadyInfo {
    #[serde(rename = "dbPath")]
    pub origin: PathBuf,
}

/// Everything the poll engine reports to consumers.
///
/// Within one engine: `Ready` precedes the first `Poll`, and a cycle's `Poll`
/// precedes any `History` from the same cycle.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedSignal {
    Ready(ReadyInfo),
    /// Catalog page, only when track emission is enabled.
    Tracks(TracksPayload),
    /// Heartbeat, once per tick.
    Poll,
    History(PollResult),
    Error {
        #[serde(serialize_with = "serialize_error")]
        error: FeedError,
    },
}

impl FeedSignal {
    pub fn error(error: FeedError) -> Self {
        Self::Error { error }
    }

    pub fn signal_type(&self) -> &'static str {
        match self {
            Self::Ready(_) => "ready",
            Self::Tracks(_) => "tracks",
            Self::Poll => "poll",
            Self::History(_) => "history",
            Self::Error { .. } => "error",
        }
    }
}

fn serialize_error<S: Serializer>(error: &FeedError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&error.to_string())
}

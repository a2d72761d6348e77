pub mod errors;
pub mod history;
pub mod params;
pub mod signals;

pub use errors::FeedError;
pub use history::{HistoryEntry, LogRecord, PollResult, Track, TrackInfo, TracksPayload};
pub use params::ConnectionParams;
pub use signals::{FeedSignal, ReadyInfo};

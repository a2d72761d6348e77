//! Incremental history polling over the DJ library database.

pub mod cursor;
pub mod engine;
pub mod mock;
pub mod source;

pub use cursor::CursorTracker;
pub use engine::{EngineState, PollEngine};
pub use source::{HistorySource, LibraryProvider, SourceProvider};

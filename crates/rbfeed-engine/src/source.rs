//! Seams between the engine and the database.

use std::path::{Path, PathBuf};

use rbfeed_core::{FeedError, LogRecord, PollResult, TracksPayload};
use rbfeed_settings::{resolve_connection, FeedSettings};
use rbfeed_store::StoreHandle;

/// What the poll engine needs from a history store.
///
/// Reads come in two tiers: a query failure is folded into an empty
/// [`PollResult`] by the implementation, while an `Err` is a failure the
/// engine reports as an `error` signal.
pub trait HistorySource: Send + 'static {
    fn origin(&self) -> PathBuf;

    fn open(&mut self) -> Result<(), FeedError>;

    /// Must be safe to call repeatedly.
    fn close(&mut self);

    fn latest_sequence(&self) -> Option<i64>;

    fn new_records(&self, since: Option<i64>, max_rows: u32) -> Result<PollResult, FeedError>;

    fn load_tracks(&self, max_rows: u32) -> Result<TracksPayload, FeedError>;

    fn remove_last(&mut self) -> Option<LogRecord>;

    fn insert_record(&mut self, record: &LogRecord) -> bool;
}

/// Resolves connection parameters and builds an unopened source.
pub trait SourceProvider: Send + Sync + 'static {
    type Source: HistorySource;

    fn provide(&self, mutable: bool) -> Result<Self::Source, FeedError>;
}

impl HistorySource for StoreHandle {
    fn origin(&self) -> PathBuf {
        StoreHandle::origin(self).to_path_buf()
    }

    fn open(&mut self) -> Result<(), FeedError> {
        Ok(StoreHandle::open(self)?)
    }

    fn close(&mut self) {
        StoreHandle::close(self);
    }

    fn latest_sequence(&self) -> Option<i64> {
        self.read_latest_sequence()
    }

    fn new_records(&self, since: Option<i64>, max_rows: u32) -> Result<PollResult, FeedError> {
        if !self.is_open() {
            return Err(FeedError::NotOpen);
        }
        Ok(self.read_new_records(since, max_rows))
    }

    fn load_tracks(&self, max_rows: u32) -> Result<TracksPayload, FeedError> {
        if !self.is_open() {
            return Err(FeedError::NotOpen);
        }
        Ok(StoreHandle::load_tracks(self, max_rows))
    }

    fn remove_last(&mut self) -> Option<LogRecord> {
        StoreHandle::remove_last(self)
    }

    fn insert_record(&mut self, record: &LogRecord) -> bool {
        StoreHandle::insert_record(self, record)
    }
}

/// Provides [`StoreHandle`]s for the library database, resolving the path
/// and password from explicit settings or the agent's options file.
#[derive(Clone, Debug)]
pub struct LibraryProvider {
    db_path: Option<PathBuf>,
    db_password: Option<String>,
    options_file: PathBuf,
}

impl LibraryProvider {
    pub fn new(db_path: Option<PathBuf>, db_password: Option<String>) -> Self {
        Self {
            db_path,
            db_password,
            options_file: rbfeed_settings::options_path(),
        }
    }

    pub fn from_settings(settings: &FeedSettings) -> Self {
        Self::new(settings.db_path.clone(), settings.db_password.clone())
    }

    pub fn with_options_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.options_file = path.into();
        self
    }

    pub fn options_file(&self) -> &Path {
        &self.options_file
    }
}

impl SourceProvider for LibraryProvider {
    type Source = StoreHandle;

    fn provide(&self, mutable: bool) -> Result<StoreHandle, FeedError> {
        let params = resolve_connection(
            self.db_path.as_deref(),
            self.db_password.as_deref(),
            &self.options_file,
        )?;
        Ok(StoreHandle::new(params, mutable))
    }
}

//! In-memory history source for deterministic engine tests.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rbfeed_core::{FeedError, HistoryEntry, LogRecord, PollResult, Track, TrackInfo, TracksPayload};

use crate::source::{HistorySource, SourceProvider};

#[derive(Default)]
struct LogState {
    records: BTreeMap<i64, LogRecord>,
    tracks: Vec<Track>,
    open_error: Option<FeedError>,
    /// Reads that return `Err` before normal behavior resumes.
    raise_reads: usize,
    /// Reads that come back degraded (empty) before normal behavior resumes.
    degrade_reads: usize,
    /// Time each history read blocks before answering.
    read_delay: Duration,
    opens: usize,
    closes: usize,
}

/// Shared log state. Clones see the same log, so a test can keep one while
/// the engine owns the source built from another.
#[derive(Clone, Default)]
pub struct MockLog {
    state: Arc<Mutex<LogState>>,
}

impl MockLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one play; returns its sequence number.
    pub fn append(&self, content_id: &str) -> i64 {
        let mut state = self.state.lock();
        let seq = state.records.keys().next_back().copied().unwrap_or(0) + 1;
        let _ = state.records.insert(seq, record(seq, content_id));
        seq
    }

    pub fn append_many(&self, content_id: &str, count: usize) -> Vec<i64> {
        (0..count).map(|_| self.append(content_id)).collect()
    }

    pub fn sequences(&self) -> Vec<i64> {
        self.state.lock().records.keys().copied().collect()
    }

    pub fn record(&self, sequence: i64) -> Option<LogRecord> {
        self.state.lock().records.get(&sequence).cloned()
    }

    pub fn add_track(&self, id: &str, title: &str) {
        self.state.lock().tracks.push(Track {
            id: id.to_string(),
            info: TrackInfo {
                title: Some(title.to_string()),
                ..Default::default()
            },
        });
    }

    /// Make every `open()` fail with `error`.
    pub fn fail_open(&self, error: FeedError) {
        self.state.lock().open_error = Some(error);
    }

    pub fn raise_next_reads(&self, count: usize) {
        self.state.lock().raise_reads = count;
    }

    pub fn degrade_next_reads(&self, count: usize) {
        self.state.lock().degrade_reads = count;
    }

    /// Make every history read block for `delay`, as a slow query would.
    pub fn delay_reads(&self, delay: Duration) {
        self.state.lock().read_delay = delay;
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().opens
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }
}

fn record(sequence: i64, content_id: &str) -> LogRecord {
    LogRecord {
        sequence,
        id: format!("sh-{sequence}"),
        history_id: Some("h1".to_string()),
        content_id: Some(content_id.to_string()),
        track_no: Some(sequence),
        uuid: Some(format!("uuid-{sequence}")),
        rb_data_status: Some(0),
        rb_local_data_status: Some(0),
        rb_local_deleted: Some(0),
        rb_local_synced: Some(0),
        usn: Some(sequence),
        rb_local_usn: Some(sequence),
        created_at: Some(format!("2024-01-01 00:00:{:02}.000", sequence % 60)),
        updated_at: None,
    }
}

fn entry(record: &LogRecord) -> HistoryEntry {
    HistoryEntry {
        sequence: record.sequence,
        id: record.id.clone(),
        created_at: record.created_at.clone(),
        track: TrackInfo {
            title: record.content_id.clone(),
            ..Default::default()
        },
    }
}

/// Source over a [`MockLog`].
pub struct MockSource {
    log: MockLog,
    origin: PathBuf,
    mutable: bool,
    open: bool,
}

impl MockSource {
    pub fn new(log: MockLog, origin: impl Into<PathBuf>, mutable: bool) -> Self {
        Self {
            log,
            origin: origin.into(),
            mutable,
            open: false,
        }
    }
}

impl HistorySource for MockSource {
    fn origin(&self) -> PathBuf {
        self.origin.clone()
    }

    fn open(&mut self) -> Result<(), FeedError> {
        self.close();
        let mut state = self.log.state.lock();
        if let Some(e) = &state.open_error {
            return Err(e.clone());
        }
        state.opens += 1;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.log.state.lock().closes += 1;
        }
    }

    fn latest_sequence(&self) -> Option<i64> {
        if !self.open {
            return None;
        }
        self.log.state.lock().records.keys().next_back().copied()
    }

    fn new_records(&self, since: Option<i64>, max_rows: u32) -> Result<PollResult, FeedError> {
        if !self.open {
            return Err(FeedError::NotOpen);
        }
        let delay = self.log.state.lock().read_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let mut state = self.log.state.lock();
        if state.raise_reads > 0 {
            state.raise_reads -= 1;
            return Err(FeedError::TransientPoll("simulated read failure".into()));
        }
        if state.degrade_reads > 0 {
            state.degrade_reads -= 1;
            return Ok(PollResult::empty(self.origin.clone(), since));
        }
        let floor = since.unwrap_or(0);
        let entries = state
            .records
            .range(floor + 1..)
            .take(max_rows as usize)
            .map(|(_, r)| entry(r))
            .collect();
        Ok(PollResult::new(self.origin.clone(), since, entries))
    }

    fn load_tracks(&self, max_rows: u32) -> Result<TracksPayload, FeedError> {
        if !self.open {
            return Err(FeedError::NotOpen);
        }
        let state = self.log.state.lock();
        let tracks = state.tracks.iter().take(max_rows as usize).cloned().collect();
        Ok(TracksPayload::new(self.origin.clone(), tracks))
    }

    fn remove_last(&mut self) -> Option<LogRecord> {
        if !self.mutable || !self.open {
            return None;
        }
        self.log.state.lock().records.pop_last().map(|(_, r)| r)
    }

    fn insert_record(&mut self, record: &LogRecord) -> bool {
        if !self.mutable || !self.open {
            return false;
        }
        let mut state = self.log.state.lock();
        if state.records.contains_key(&record.sequence) {
            return false;
        }
        let _ = state.records.insert(record.sequence, record.clone());
        true
    }
}

/// Provider handing out [`MockSource`]s over one shared log.
#[derive(Clone)]
pub struct MockProvider {
    log: MockLog,
    origin: PathBuf,
    resolve_error: Option<FeedError>,
}

impl MockProvider {
    pub fn new(log: MockLog) -> Self {
        Self {
            log,
            origin: PathBuf::from("/mock/master.db"),
            resolve_error: None,
        }
    }

    /// Make resolution fail, as when no configuration exists.
    pub fn failing(error: FeedError) -> Self {
        Self {
            resolve_error: Some(error),
            ..Self::new(MockLog::new())
        }
    }

    pub fn log(&self) -> &MockLog {
        &self.log
    }
}

impl SourceProvider for MockProvider {
    type Source = MockSource;

    fn provide(&self, mutable: bool) -> Result<MockSource, FeedError> {
        if let Some(e) = &self.resolve_error {
            return Err(e.clone());
        }
        Ok(MockSource::new(self.log.clone(), self.origin.clone(), mutable))
    }
}

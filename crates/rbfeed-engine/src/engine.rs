//! The poll engine: seeds a cursor from the log, then re-queries on a fixed
//! interval and reports new history rows as signals.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rbfeed_core::{FeedError, FeedSignal, LogRecord, ReadyInfo, TracksPayload};
use rbfeed_settings::FeedSettings;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cursor::CursorTracker;
use crate::source::{HistorySource, SourceProvider};

/// Lifecycle of a [`PollEngine`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// Not started, or the last `start()` failed.
    Idle,
    Running,
    Stopped,
}

/// What a single poll cycle did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// The engine was stopped before the cycle began.
    Skipped,
    /// Nothing new, or a degraded read.
    Empty,
    /// A `history` signal with this many entries was emitted.
    Delivered(usize),
    /// The read raised; an `error` signal was emitted.
    Failed,
}

/// Handle to the repeating poll task.
struct Timer {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// State one poll cycle needs, cloned into each tick.
pub(crate) struct PollTask<S> {
    source: Arc<Mutex<S>>,
    cursor: Arc<Mutex<CursorTracker>>,
    events: broadcast::Sender<FeedSignal>,
    history_rows: u32,
    cancel: CancellationToken,
}

impl<S> Clone for PollTask<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            cursor: Arc::clone(&self.cursor),
            events: self.events.clone(),
            history_rows: self.history_rows,
            cancel: self.cancel.clone(),
        }
    }
}

impl<S: HistorySource> PollTask<S> {
    /// One cycle: heartbeat, read after the cursor, advance and deliver.
    ///
    /// The cursor is read once, at the start of the cycle.
    pub(crate) fn poll_once(&self) -> PollOutcome {
        if self.cancel.is_cancelled() {
            return PollOutcome::Skipped;
        }
        let _ = self.events.send(FeedSignal::Poll);

        let since = self.cursor.lock().current();
        let result = self.source.lock().new_records(since, self.history_rows);

        match result {
            Ok(result) if result.count > 0 => {
                let count = result.count;
                self.cursor.lock().advance_to(result.cursor);
                debug!(count, cursor = ?result.cursor, "new history entries");
                let _ = self.events.send(FeedSignal::History(result));
                PollOutcome::Delivered(count)
            }
            Ok(_) => PollOutcome::Empty,
            Err(FeedError::NotOpen) if self.cancel.is_cancelled() => PollOutcome::Skipped,
            Err(e) => {
                let e = match e {
                    FeedError::TransientPoll(_) => e,
                    other => FeedError::TransientPoll(other.to_string()),
                };
                warn!(error = %e, ?since, "poll cycle failed");
                let _ = self.events.send(FeedSignal::error(e));
                PollOutcome::Failed
            }
        }
    }

    /// Tick every `period` until cancelled. The first tick is one period
    /// after the call; ticks missed while a cycle runs are skipped.
    async fn run(self, period: Duration) {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let task = self.clone();
                    if let Err(e) = tokio::task::spawn_blocking(move || task.poll_once()).await {
                        error!(error = %e, "poll cycle panicked");
                        let _ = self
                            .events
                            .send(FeedSignal::error(FeedError::TransientPoll(e.to_string())));
                    }
                }
            }
        }
        debug!("poll loop stopped");
    }
}

/// Polls a history source for appended rows and broadcasts [`FeedSignal`]s.
///
/// `start()` and `stop()` never fail; every failure becomes an `error`
/// signal. Nothing retries a failed `start()`.
pub struct PollEngine<P: SourceProvider> {
    provider: P,
    settings: FeedSettings,
    events: broadcast::Sender<FeedSignal>,
    cursor: Arc<Mutex<CursorTracker>>,
    source: Option<Arc<Mutex<P::Source>>>,
    timer: Option<Timer>,
    state: EngineState,
}

impl<P: SourceProvider> PollEngine<P> {
    pub fn new(provider: P, settings: FeedSettings) -> Self {
        let (events, _) = broadcast::channel(settings.channel_capacity.max(1));
        Self {
            provider,
            settings,
            events,
            cursor: Arc::new(Mutex::new(CursorTracker::new())),
            source: None,
            timer: None,
            state: EngineState::Idle,
        }
    }

    /// Receive signals emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedSignal> {
        self.events.subscribe()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn cursor(&self) -> Option<i64> {
        self.cursor.lock().current()
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    pub fn mutation_enabled(&self) -> bool {
        self.settings.dangerously_modify_history
    }

    /// Open the source, seed the cursor, emit `ready`, then arm the timer.
    ///
    /// Must be called inside a tokio runtime. A running engine is torn down
    /// first. On failure one `error` is emitted and the engine is `Idle`
    /// with no timer armed.
    pub fn start(&mut self) {
        self.teardown();
        match self.try_start() {
            Ok(()) => self.state = EngineState::Running,
            Err(e) => {
                error!(error = %e, kind = e.error_kind(), "failed to start history feed");
                self.state = EngineState::Idle;
                self.emit(FeedSignal::error(e));
            }
        }
    }

    fn try_start(&mut self) -> Result<(), FeedError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| FeedError::NoRuntime)?;

        let mut source = self
            .provider
            .provide(self.settings.dangerously_modify_history)?;
        source.open()?;

        let seed = source.latest_sequence();
        *self.cursor.lock() = CursorTracker::seeded(seed);

        let origin = source.origin();
        info!(path = %origin.display(), cursor = ?seed, "history feed ready");
        self.emit(FeedSignal::Ready(ReadyInfo { origin }));

        if self.settings.emit_tracks {
            match source.load_tracks(self.settings.max_rows) {
                Ok(payload) => self.emit(FeedSignal::Tracks(payload)),
                Err(e) => self.emit(FeedSignal::error(e)),
            }
        }

        let source = Arc::new(Mutex::new(source));
        let cancel = CancellationToken::new();
        let poll = PollTask {
            source: Arc::clone(&source),
            cursor: Arc::clone(&self.cursor),
            events: self.events.clone(),
            history_rows: self.settings.history_max_rows,
            cancel: cancel.clone(),
        };
        let period = self.settings.poll_interval().max(Duration::from_millis(1));
        let task = runtime.spawn(poll.run(period));

        self.source = Some(source);
        self.timer = Some(Timer { cancel, task });
        Ok(())
    }

    /// Cancel the timer and close the source. Idempotent; emits nothing.
    ///
    /// Returns without waiting. A cycle already in flight is not aborted and
    /// may still emit; the source is closed when it finishes.
    pub fn stop(&mut self) {
        self.teardown();
        self.state = EngineState::Stopped;
    }

    fn teardown(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel.cancel();
            drop(timer.task);
        }
        if let Some(source) = self.source.take() {
            close_source(source);
            info!("history feed stopped");
        }
    }

    /// Load the catalog from the open source.
    pub fn load_tracks(&self) -> Option<TracksPayload> {
        let source = self.source.as_ref()?;
        let result = source.lock().load_tracks(self.settings.max_rows);
        match result {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!(error = %e, "track load failed");
                None
            }
        }
    }

    /// Remove and return the newest history record.
    ///
    /// No effect unless history modification was enabled. Pair with
    /// [`Self::push_history`]; nothing restores a popped record on its own.
    pub fn pop_history(&self) -> Option<LogRecord> {
        if !self.mutation_enabled() {
            debug!("pop_history ignored: history modification disabled");
            return None;
        }
        let source = self.source.as_ref()?;
        source.lock().remove_last()
    }

    /// Re-insert a record, normally one returned by [`Self::pop_history`],
    /// under its original sequence number.
    pub fn push_history(&self, record: &LogRecord) -> bool {
        if !self.mutation_enabled() {
            debug!("push_history ignored: history modification disabled");
            return false;
        }
        let Some(source) = self.source.as_ref() else {
            return false;
        };
        source.lock().insert_record(record)
    }

    fn emit(&self, signal: FeedSignal) {
        // No subscribers is not an error.
        let _ = self.events.send(signal);
    }
}

/// Close now if no cycle holds the source, otherwise once that cycle ends.
///
/// Never waits on an in-flight read.
fn close_source<S: HistorySource>(source: Arc<Mutex<S>>) {
    if let Some(mut guard) = source.try_lock() {
        guard.close();
        return;
    }
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            debug!("poll cycle in flight, deferring close");
            drop(runtime.spawn_blocking(move || source.lock().close()));
        }
        Err(_) => drop(std::thread::spawn(move || source.lock().close())),
    }
}

impl<P: SourceProvider> Drop for PollEngine<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::mock::{MockLog, MockProvider, MockSource};

    fn settings() -> FeedSettings {
        FeedSettings {
            poll_interval_ms: 20,
            ..FeedSettings::default()
        }
    }

    fn drain(rx: &mut broadcast::Receiver<FeedSignal>) -> Vec<FeedSignal> {
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(signal) => out.push(signal),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return out,
                Err(TryRecvError::Lagged(_)) => {}
            }
        }
    }

    fn types(signals: &[FeedSignal]) -> Vec<&'static str> {
        signals.iter().map(FeedSignal::signal_type).collect()
    }

    async fn next_signal(rx: &mut broadcast::Receiver<FeedSignal>) -> FeedSignal {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for signal")
            .expect("channel closed")
    }

    fn poll_task(log: &MockLog, seed: Option<i64>) -> (PollTask<MockSource>, broadcast::Receiver<FeedSignal>) {
        let mut source = MockSource::new(log.clone(), "/mock/master.db", false);
        source.open().unwrap();
        let (events, rx) = broadcast::channel(64);
        let task = PollTask {
            source: Arc::new(Mutex::new(source)),
            cursor: Arc::new(Mutex::new(CursorTracker::seeded(seed))),
            events,
            history_rows: 100,
            cancel: CancellationToken::new(),
        };
        (task, rx)
    }

    // ── lifecycle ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn stop_without_start_is_silent() {
        let mut engine = PollEngine::new(MockProvider::new(MockLog::new()), settings());
        let mut rx = engine.subscribe();
        engine.stop();
        engine.stop();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn stop_closes_source_once() {
        let provider = MockProvider::new(MockLog::new());
        let log = provider.log().clone();
        let mut engine = PollEngine::new(provider, settings());
        engine.start();
        engine.stop();
        engine.stop();
        assert_eq!(log.open_count(), 1);
        assert_eq!(log.close_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_returns_while_poll_in_flight() {
        let log = MockLog::new();
        log.delay_reads(Duration::from_millis(1500));
        let settings = FeedSettings {
            poll_interval_ms: 10,
            ..settings()
        };
        let mut engine = PollEngine::new(MockProvider::new(log.clone()), settings);
        engine.start();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let begun = std::time::Instant::now();
        engine.stop();
        assert!(begun.elapsed() < Duration::from_millis(100), "stop took {:?}", begun.elapsed());
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(log.close_count(), 0, "in-flight read still owns the source");

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while log.close_count() == 0 && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(log.open_count(), 1);
        assert_eq!(log.close_count(), 1);
    }

    #[tokio::test]
    async fn failed_resolution_emits_one_error() {
        let provider = MockProvider::failing(FeedError::ConfigNotFound("no options.json".into()));
        let mut engine = PollEngine::new(provider, settings());
        let mut rx = engine.subscribe();

        engine.start();

        assert_eq!(engine.state(), EngineState::Idle);
        let signals = drain(&mut rx);
        assert_eq!(types(&signals), vec!["error"]);
        assert!(matches!(
            &signals[0],
            FeedSignal::Error { error: FeedError::ConfigNotFound(_) }
        ));
    }

    #[tokio::test]
    async fn missing_database_emits_error_and_no_timer() {
        let log = MockLog::new();
        log.fail_open(FeedError::NotFound(PathBuf::from("/mock/master.db")));
        let mut engine = PollEngine::new(MockProvider::new(log), settings());
        let mut rx = engine.subscribe();

        engine.start();
        tokio::time::sleep(Duration::from_millis(80)).await;

        let signals = drain(&mut rx);
        assert_eq!(types(&signals), vec!["error"]);
        assert!(engine.timer.is_none());
    }

    #[test]
    fn start_outside_runtime_reports_no_runtime() {
        let mut engine = PollEngine::new(MockProvider::new(MockLog::new()), settings());
        let mut rx = engine.subscribe();
        engine.start();
        assert_eq!(engine.state(), EngineState::Idle);
        let signals = drain(&mut rx);
        assert!(matches!(&signals[..], [FeedSignal::Error { error: FeedError::NoRuntime }]));
    }

    #[tokio::test]
    async fn start_seeds_cursor_from_latest() {
        let log = MockLog::new();
        log.append_many("c1", 100);
        let mut engine = PollEngine::new(MockProvider::new(log), settings());
        engine.start();
        assert_eq!(engine.state(), EngineState::Running);
        assert_eq!(engine.cursor(), Some(100));
        engine.stop();
    }

    #[tokio::test]
    async fn empty_log_leaves_cursor_unset() {
        let mut engine = PollEngine::new(MockProvider::new(MockLog::new()), settings());
        engine.start();
        assert_eq!(engine.cursor(), None);
        engine.stop();
    }

    #[tokio::test]
    async fn ready_precedes_first_poll_and_idle_polls_deliver_nothing() {
        let log = MockLog::new();
        log.append_many("c1", 3);
        let mut engine = PollEngine::new(MockProvider::new(log), settings());
        let mut rx = engine.subscribe();
        engine.start();

        assert!(matches!(next_signal(&mut rx).await, FeedSignal::Ready(info) if info.origin == PathBuf::from("/mock/master.db")));
        assert_eq!(next_signal(&mut rx).await, FeedSignal::Poll);
        assert_eq!(next_signal(&mut rx).await, FeedSignal::Poll);
        engine.stop();

        let rest = drain(&mut rx);
        assert!(rest.iter().all(|s| *s == FeedSignal::Poll));
    }

    #[tokio::test]
    async fn running_engine_delivers_appended_rows() {
        let log = MockLog::new();
        log.append_many("c1", 100);
        let mut engine = PollEngine::new(MockProvider::new(log.clone()), settings());
        let mut rx = engine.subscribe();
        engine.start();

        log.append("c2");
        log.append("c3");

        let result = loop {
            match next_signal(&mut rx).await {
                FeedSignal::History(result) => break result,
                FeedSignal::Error { error } => panic!("unexpected error: {error}"),
                _ => {}
            }
        };
        let seqs: Vec<i64> = result.entries.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![101, 102]);
        assert_eq!(engine.cursor(), Some(102));
        engine.stop();
    }

    #[tokio::test]
    async fn emit_tracks_follows_ready() {
        let log = MockLog::new();
        log.add_track("c1", "Strobe");
        let settings = FeedSettings {
            emit_tracks: true,
            ..settings()
        };
        let mut engine = PollEngine::new(MockProvider::new(log), settings);
        let mut rx = engine.subscribe();
        engine.start();
        engine.stop();

        let signals = drain(&mut rx);
        assert_eq!(&types(&signals)[..2], &["ready", "tracks"]);
        assert!(matches!(&signals[1], FeedSignal::Tracks(p) if p.count == 1));
    }

    #[tokio::test]
    async fn restart_reopens_and_reseeds() {
        let log = MockLog::new();
        log.append_many("c1", 2);
        let mut engine = PollEngine::new(MockProvider::new(log.clone()), settings());
        engine.start();
        log.append("c1");
        engine.start();
        assert_eq!(engine.cursor(), Some(3));
        assert_eq!(log.open_count(), 2);
        assert_eq!(log.close_count(), 1);
        engine.stop();
        assert_eq!(log.close_count(), 2);
    }

    // ── poll cycle ──────────────────────────────────────────────────────

    #[test]
    fn poll_delivers_new_rows_in_order() {
        let log = MockLog::new();
        log.append_many("c1", 100);
        let (task, mut rx) = poll_task(&log, Some(100));
        log.append("c2");
        log.append("c3");

        assert_eq!(task.poll_once(), PollOutcome::Delivered(2));

        let signals = drain(&mut rx);
        assert_eq!(types(&signals), vec!["poll", "history"]);
        let FeedSignal::History(result) = &signals[1] else {
            unreachable!()
        };
        assert_eq!(result.count, 2);
        let seqs: Vec<i64> = result.entries.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![101, 102]);
        assert_eq!(task.cursor.lock().current(), Some(102));
    }

    #[test]
    fn poll_without_writes_only_heartbeats() {
        let log = MockLog::new();
        log.append_many("c1", 5);
        let (task, mut rx) = poll_task(&log, Some(5));

        assert_eq!(task.poll_once(), PollOutcome::Empty);
        assert_eq!(drain(&mut rx), vec![FeedSignal::Poll]);
        assert_eq!(task.cursor.lock().current(), Some(5));
    }

    #[test]
    fn raised_read_reports_error_and_keeps_cursor() {
        let log = MockLog::new();
        log.append_many("c1", 10);
        let (task, mut rx) = poll_task(&log, Some(10));
        log.append("c2");
        log.raise_next_reads(1);

        assert_eq!(task.poll_once(), PollOutcome::Failed);
        let signals = drain(&mut rx);
        assert_eq!(types(&signals), vec!["poll", "error"]);
        assert_eq!(task.cursor.lock().current(), Some(10));

        log.append("c3");
        assert_eq!(task.poll_once(), PollOutcome::Delivered(2));
        let signals = drain(&mut rx);
        let FeedSignal::History(result) = &signals[1] else {
            unreachable!()
        };
        let seqs: Vec<i64> = result.entries.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![11, 12]);
    }

    #[test]
    fn degraded_read_is_silent_and_keeps_cursor() {
        let log = MockLog::new();
        log.append_many("c1", 10);
        let (task, mut rx) = poll_task(&log, Some(10));
        log.append("c2");
        log.degrade_next_reads(1);

        assert_eq!(task.poll_once(), PollOutcome::Empty);
        assert_eq!(drain(&mut rx), vec![FeedSignal::Poll]);
        assert_eq!(task.cursor.lock().current(), Some(10));

        assert_eq!(task.poll_once(), PollOutcome::Delivered(1));
        assert_eq!(task.cursor.lock().current(), Some(11));
    }

    #[test]
    fn unset_cursor_delivers_first_rows() {
        let log = MockLog::new();
        let (task, mut rx) = poll_task(&log, None);
        log.append("c1");

        assert_eq!(task.poll_once(), PollOutcome::Delivered(1));
        assert_eq!(task.cursor.lock().current(), Some(1));
        assert_eq!(types(&drain(&mut rx)), vec!["poll", "history"]);
    }

    #[test]
    fn page_size_limits_each_cycle() {
        let log = MockLog::new();
        let (mut task, _rx) = poll_task(&log, Some(0));
        task.history_rows = 2;
        log.append_many("c1", 5);

        assert_eq!(task.poll_once(), PollOutcome::Delivered(2));
        assert_eq!(task.poll_once(), PollOutcome::Delivered(2));
        assert_eq!(task.poll_once(), PollOutcome::Delivered(1));
        assert_eq!(task.cursor.lock().current(), Some(5));
    }

    #[test]
    fn closed_source_after_cancel_is_not_reported() {
        let log = MockLog::new();
        let (task, _rx) = poll_task(&log, None);
        task.source.lock().close();
        task.cancel.cancel();
        assert_eq!(task.poll_once(), PollOutcome::Skipped);
    }

    #[test]
    fn cancelled_task_skips_cycle() {
        let log = MockLog::new();
        let (task, mut rx) = poll_task(&log, None);
        task.cancel.cancel();
        assert_eq!(task.poll_once(), PollOutcome::Skipped);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn closed_source_without_cancel_is_reported() {
        let log = MockLog::new();
        let (task, mut rx) = poll_task(&log, None);
        task.source.lock().close();
        assert_eq!(task.poll_once(), PollOutcome::Failed);
        assert_eq!(types(&drain(&mut rx)), vec!["poll", "error"]);
    }

    // ── mutation protocol ───────────────────────────────────────────────

    #[tokio::test]
    async fn mutation_disabled_never_touches_log() {
        let log = MockLog::new();
        log.append_many("c1", 3);
        let mut engine = PollEngine::new(MockProvider::new(log.clone()), settings());
        engine.start();

        assert_eq!(engine.pop_history(), None);
        let record = log.record(3).unwrap();
        assert!(!engine.push_history(&record));
        assert_eq!(log.sequences(), vec![1, 2, 3]);
        engine.stop();
    }

    #[tokio::test]
    async fn pop_then_push_restores_log() {
        let log = MockLog::new();
        log.append_many("c1", 3);
        let settings = FeedSettings {
            dangerously_modify_history: true,
            ..settings()
        };
        let mut engine = PollEngine::new(MockProvider::new(log.clone()), settings);
        engine.start();
        let before = log.record(3).unwrap();

        let popped = engine.pop_history().unwrap();
        assert_eq!(popped, before);
        assert_eq!(log.sequences(), vec![1, 2]);

        assert!(engine.push_history(&popped));
        assert_eq!(log.sequences(), vec![1, 2, 3]);
        assert_eq!(log.record(3), Some(before));
        engine.stop();
    }

    #[tokio::test]
    async fn mutation_requires_running_source() {
        let log = MockLog::new();
        log.append("c1");
        let settings = FeedSettings {
            dangerously_modify_history: true,
            ..settings()
        };
        let engine = PollEngine::new(MockProvider::new(log.clone()), settings);
        assert_eq!(engine.pop_history(), None);
        assert_eq!(log.sequences(), vec![1]);
    }
}

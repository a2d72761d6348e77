//! End-to-end polling against an encrypted fixture database.

use std::path::Path;
use std::time::Duration;

use rbfeed_core::{FeedError, FeedSignal, PollResult};
use rbfeed_engine::{EngineState, LibraryProvider, PollEngine};
use rbfeed_settings::FeedSettings;
use rbfeed_store::fixture::{Fixture, FixtureTrack};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

const PASSWORD: &str = "fixture-key";

fn settings(path: &Path, password: &str) -> FeedSettings {
    FeedSettings {
        db_path: Some(path.to_path_buf()),
        db_password: Some(password.to_string()),
        poll_interval_ms: 25,
        ..FeedSettings::default()
    }
}

fn engine(settings: FeedSettings) -> PollEngine<LibraryProvider> {
    PollEngine::new(LibraryProvider::from_settings(&settings), settings)
}

fn drain(rx: &mut broadcast::Receiver<FeedSignal>) -> Vec<FeedSignal> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(signal) => out.push(signal),
            Err(TryRecvError::Lagged(_)) => {}
            Err(_) => return out,
        }
    }
}

async fn next_history(rx: &mut broadcast::Receiver<FeedSignal>) -> PollResult {
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(FeedSignal::History(result)) => return result,
                Ok(FeedSignal::Error { error }) => panic!("unexpected error signal: {error}"),
                Ok(_) => {}
                Err(e) => panic!("signal channel failed: {e}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("no history signal within 5s")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delivers_rows_appended_after_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("master.db");
    let fixture = Fixture::create(&path, PASSWORD).unwrap();
    fixture
        .add_track(&FixtureTrack::new("c1", "Opener").artist("Someone"))
        .unwrap();
    fixture
        .add_track(&FixtureTrack::new("c2", "Closer").genre("Techno"))
        .unwrap();
    fixture.append_many("c1", 100).unwrap();

    let mut engine = engine(settings(&path, PASSWORD));
    let mut rx = engine.subscribe();
    engine.start();

    assert_eq!(engine.state(), EngineState::Running);
    assert_eq!(engine.cursor(), Some(100));
    assert!(matches!(rx.recv().await.unwrap(), FeedSignal::Ready(info) if info.origin == path));

    fixture.append_history("c1").unwrap();
    fixture.append_history("c2").unwrap();

    let result = next_history(&mut rx).await;
    let seqs: Vec<i64> = result.entries.iter().map(|e| e.sequence).collect();
    assert_eq!(seqs, vec![101, 102]);
    assert_eq!(result.count, 2);
    assert_eq!(result.cursor, Some(102));
    assert_eq!(result.entries[0].track.title.as_deref(), Some("Opener"));
    assert_eq!(result.entries[0].track.artist.as_deref(), Some("Someone"));
    assert_eq!(result.entries[1].track.genre.as_deref(), Some("Techno"));
    assert_eq!(engine.cursor(), Some(102));

    engine.stop();
    assert_eq!(engine.state(), EngineState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn first_rows_of_empty_log_are_delivered() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("master.db");
    let fixture = Fixture::create(&path, PASSWORD).unwrap();
    fixture.add_track(&FixtureTrack::new("c1", "Only")).unwrap();

    let mut engine = engine(settings(&path, PASSWORD));
    let mut rx = engine.subscribe();
    engine.start();
    assert_eq!(engine.cursor(), None);

    fixture.append_history("c1").unwrap();
    let result = next_history(&mut rx).await;
    assert_eq!(result.entries.len(), 1);
    assert_eq!(engine.cursor(), result.cursor);
    engine.stop();
}

#[tokio::test]
async fn missing_database_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.db");

    let mut engine = engine(settings(&path, PASSWORD));
    let mut rx = engine.subscribe();
    engine.start();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let signals = drain(&mut rx);
    assert_eq!(signals.len(), 1);
    assert!(matches!(
        &signals[0],
        FeedSignal::Error { error: FeedError::NotFound(p) } if *p == path
    ));
    assert_eq!(engine.state(), EngineState::Idle);
    assert!(!path.exists());
}

#[tokio::test]
async fn wrong_password_reports_authentication_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("master.db");
    let _fixture = Fixture::create(&path, PASSWORD).unwrap();

    let mut engine = engine(settings(&path, "not-the-key"));
    let mut rx = engine.subscribe();
    engine.start();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let signals = drain(&mut rx);
    assert_eq!(signals.len(), 1);
    assert!(matches!(
        &signals[0],
        FeedSignal::Error { error: FeedError::AuthenticationFailed(_) }
    ));
    assert_eq!(engine.state(), EngineState::Idle);
}

#[tokio::test]
async fn emit_tracks_sends_catalog_after_ready() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("master.db");
    let fixture = Fixture::create(&path, PASSWORD).unwrap();
    fixture.add_track(&FixtureTrack::new("c1", "One")).unwrap();
    fixture.add_track(&FixtureTrack::new("c2", "Two")).unwrap();

    let mut engine = engine(FeedSettings {
        emit_tracks: true,
        ..settings(&path, PASSWORD)
    });
    let mut rx = engine.subscribe();
    engine.start();
    engine.stop();

    let signals = drain(&mut rx);
    assert!(matches!(&signals[0], FeedSignal::Ready(_)));
    let FeedSignal::Tracks(payload) = &signals[1] else {
        panic!("expected tracks, got {:?}", signals[1]);
    };
    assert_eq!(payload.count, 2);
}

#[tokio::test]
async fn pop_and_push_round_trip_through_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("master.db");
    let fixture = Fixture::create(&path, PASSWORD).unwrap();
    fixture.add_track(&FixtureTrack::new("c1", "Loop")).unwrap();
    fixture.append_many("c1", 3).unwrap();

    let mut engine = engine(FeedSettings {
        dangerously_modify_history: true,
        ..settings(&path, PASSWORD)
    });
    engine.start();
    assert_eq!(engine.state(), EngineState::Running);

    let popped = engine.pop_history().expect("newest record");
    assert_eq!(popped.sequence, 3);
    assert_eq!(fixture.history_count().unwrap(), 2);
    assert_eq!(fixture.max_sequence().unwrap(), Some(2));

    assert!(engine.push_history(&popped));
    assert_eq!(fixture.history_count().unwrap(), 3);
    assert_eq!(fixture.max_sequence().unwrap(), Some(3));

    assert!(!engine.push_history(&popped), "duplicate sequence must be refused");
    engine.stop();
}

#[tokio::test]
async fn mutation_disabled_leaves_log_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("master.db");
    let fixture = Fixture::create(&path, PASSWORD).unwrap();
    fixture.add_track(&FixtureTrack::new("c1", "Loop")).unwrap();
    fixture.append_many("c1", 3).unwrap();

    let mut engine = engine(settings(&path, PASSWORD));
    engine.start();

    assert_eq!(engine.pop_history(), None);
    assert_eq!(fixture.history_count().unwrap(), 3);
    engine.stop();
}

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A full `djmdSongHistory` row, as needed to restore it verbatim.
/// `sequence` is the SQLite rowid and is the only reliable ordering signal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(rename = "rowid")]
    pub sequence: i64,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "HistoryID")]
    pub history_id: Option<String>,
    #[serde(rename = "ContentID")]
    pub content_id: Option<String>,
    #[serde(rename = "TrackNo")]
    pub track_no: Option<i64>,
    #[serde(rename = "UUID")]
    pub uuid: Option<String>,
    pub rb_data_status: Option<i64>,
    pub rb_local_data_status: Option<i64>,
    pub rb_local_deleted: Option<i64>,
    pub rb_local_synced: Option<i64>,
    pub usn: Option<i64>,
    pub rb_local_usn: Option<i64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Catalog attributes of a track with reference-table names resolved.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub file_path: Option<String>,
    pub title: Option<String>,
    pub sub_title: Option<String>,
    pub artist: Option<String>,
    pub image_path: Option<String>,
    pub bpm: Option<i64>,
    pub rating: Option<i64>,
    pub release_date: Option<String>,
    pub length: Option<i64>,
    pub color_id: Option<String>,
    pub comment: Option<String>,
    pub isrc: Option<String>,
    pub album: Option<String>,
    pub label: Option<String>,
    pub genre: Option<String>,
    pub key: Option<String>,
    pub remixer: Option<String>,
}

/// One catalog entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    #[serde(flatten)]
    pub info: TrackInfo,
}

/// A history row joined with its catalog entry. Read-only, never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "rowid")]
    pub sequence: i64,
    pub id: String,
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub track: TrackInfo,
}

/// Result of one incremental history read.
///
/// `cursor` is the sequence of the last entry, or the `since` value the read
/// started from when nothing new was found (including failed reads).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PollResult {
    #[serde(rename = "dbPath")]
    pub origin: PathBuf,
    pub count: usize,
    #[serde(rename = "rows")]
    pub entries: Vec<HistoryEntry>,
    #[serde(rename = "lastRowId")]
    pub cursor: Option<i64>,
}

impl PollResult {
    pub fn new(origin: PathBuf, since: Option<i64>, entries: Vec<HistoryEntry>) -> Self {
        let cursor = entries.last().map(|e| e.sequence).or(since);
        Self {
            origin,
            count: entries.len(),
            entries,
            cursor,
        }
    }

    /// Degraded result: nothing delivered, cursor unchanged.
    pub fn empty(origin: PathBuf, since: Option<i64>) -> Self {
        Self::new(origin, since, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Catalog page delivered by a track load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TracksPayload {
    #[serde(rename = "dbPath")]
    pub origin: PathBuf,
    pub count: usize,
    #[serde(rename = "rows")]
    pub tracks: Vec<Track>,
}

impl TracksPayload {
    pub fn new(origin: PathBuf, tracks: Vec<Track>) -> Self {
        Self {
            origin,
            count: tracks.len(),
            tracks,
        }
    }
}

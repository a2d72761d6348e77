//! Lenient column decoding.
//!
//! The external writer does not type its columns strictly (numbers show up
//! as text and ids as integers), so values are coerced instead of rejected.

use rusqlite::types::ValueRef;
use rusqlite::{Row, RowIndex};

use rbfeed_core::{HistoryEntry, LogRecord, Track, TrackInfo};

/// Column as text; integers and reals are formatted.
pub fn text<I: RowIndex>(row: &Row<'_>, idx: I) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    })
}

/// Column as integer; numeric text is parsed, anything else is `None`.
pub fn int<I: RowIndex>(row: &Row<'_>, idx: I) -> rusqlite::Result<Option<i64>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Integer(i) => Some(i),
        #[allow(clippy::cast_possible_truncation)]
        ValueRef::Real(f) => Some(f as i64),
        ValueRef::Text(t) => std::str::from_utf8(t)
            .ok()
            .and_then(|s| s.trim().parse().ok()),
        ValueRef::Null | ValueRef::Blob(_) => None,
    })
}

fn track_info(row: &Row<'_>) -> rusqlite::Result<TrackInfo> {
    Ok(TrackInfo {
        file_path: text(row, "filePath")?,
        title: text(row, "title")?,
        sub_title: text(row, "subTitle")?,
        artist: text(row, "artist")?,
        image_path: text(row, "imagePath")?,
        bpm: int(row, "bpm")?,
        rating: int(row, "rating")?,
        release_date: text(row, "releaseDate")?,
        length: int(row, "length")?,
        color_id: text(row, "colorId")?,
        comment: text(row, "comment")?,
        isrc: text(row, "isrc")?,
        album: text(row, "album")?,
        label: text(row, "label")?,
        genre: text(row, "genre")?,
        key: text(row, "key")?,
        remixer: text(row, "remixer")?,
    })
}

/// Decode a row of [`crate::schema::SELECT_NEW_HISTORY`].
pub fn history_entry(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
    Ok(HistoryEntry {
        sequence: row.get("rowid")?,
        id: text(row, "id")?.unwrap_or_default(),
        created_at: text(row, "created_at")?,
        track: track_info(row)?,
    })
}

/// Decode a row of [`crate::schema::SELECT_TRACKS`].
pub fn track(row: &Row<'_>) -> rusqlite::Result<Track> {
    Ok(Track {
        id: text(row, "id")?.unwrap_or_default(),
        info: track_info(row)?,
    })
}

/// Decode a row of [`crate::schema::SELECT_LAST_RECORD`].
pub fn log_record(row: &Row<'_>) -> rusqlite::Result<LogRecord> {
    Ok(LogRecord {
        sequence: row.get("rowid")?,
        id: text(row, "ID")?.unwrap_or_default(),
        history_id: text(row, "HistoryID")?,
        content_id: text(row, "ContentID")?,
        track_no: int(row, "TrackNo")?,
        uuid: text(row, "UUID")?,
        rb_data_status: int(row, "rb_data_status")?,
        rb_local_data_status: int(row, "rb_local_data_status")?,
        rb_local_deleted: int(row, "rb_local_deleted")?,
        rb_local_synced: int(row, "rb_local_synced")?,
        usn: int(row, "usn")?,
        rb_local_usn: int(row, "rb_local_usn")?,
        created_at: text(row, "created_at")?,
        updated_at: text(row, "updated_at")?,
    })
}

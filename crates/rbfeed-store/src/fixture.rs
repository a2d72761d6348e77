//! Encrypted stand-in databases for tests and demos.
//!
//! A [`Fixture`] plays the external application: it creates a keyed WAL
//! database with the library tables and appends history rows while a
//! [`crate::StoreHandle`] reads them.

use std::path::{Path, PathBuf};

use rusqlite::{named_params, params, Connection, OpenFlags};

use crate::error::StoreError;
use crate::schema;

/// Catalog entry plus the reference names it points at.
#[derive(Clone, Debug, Default)]
pub struct FixtureTrack {
    pub id: String,
    pub title: String,
    pub artist: Option<String>,
    pub remixer: Option<String>,
    pub album: Option<String>,
    pub label: Option<String>,
    pub genre: Option<String>,
    pub key: Option<String>,
    /// Hundredths of a beat per minute, as the library stores it.
    pub bpm: Option<i64>,
    pub length: Option<i64>,
}

impl FixtureTrack {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn artist(mut self, name: impl Into<String>) -> Self {
        self.artist = Some(name.into());
        self
    }

    pub fn genre(mut self, name: impl Into<String>) -> Self {
        self.genre = Some(name.into());
        self
    }

    pub fn key(mut self, name: impl Into<String>) -> Self {
        self.key = Some(name.into());
        self
    }
}

/// Writer-side connection to a keyed fixture database.
pub struct Fixture {
    conn: Connection,
    path: PathBuf,
}

impl Fixture {
    /// Create (or reopen) a keyed database at `path` with the library tables.
    pub fn create(path: &Path, password: &str) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.pragma_update(None, "key", password)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch(schema::FIXTURE_TABLES)?;
        Ok(Self {
            conn,
            path: path.to_owned(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Insert a catalog row and any reference rows it names.
    pub fn add_track(&self, track: &FixtureTrack) -> Result<(), StoreError> {
        let artist_id = self.reference("djmdArtist", "Name", &track.id, "artist", track.artist.as_deref())?;
        let remixer_id = self.reference("djmdArtist", "Name", &track.id, "remixer", track.remixer.as_deref())?;
        let album_id = self.reference("djmdAlbum", "Name", &track.id, "album", track.album.as_deref())?;
        let label_id = self.reference("djmdLabel", "Name", &track.id, "label", track.label.as_deref())?;
        let genre_id = self.reference("djmdGenre", "Name", &track.id, "genre", track.genre.as_deref())?;
        let key_id = self.reference("djmdKey", "ScaleName", &track.id, "key", track.key.as_deref())?;

        self.conn.execute(
            "INSERT INTO djmdContent
                (ID, FolderPath, Title, ArtistID, RemixerID, AlbumID, LabelID, GenreID, KeyID, BPM, Length)
             VALUES (:id, :path, :title, :artist, :remixer, :album, :label, :genre, :key, :bpm, :length)",
            named_params! {
                ":id": track.id,
                ":path": format!("/music/{}.mp3", track.id),
                ":title": track.title,
                ":artist": artist_id,
                ":remixer": remixer_id,
                ":album": album_id,
                ":label": label_id,
                ":genre": genre_id,
                ":key": key_id,
                ":bpm": track.bpm,
                ":length": track.length,
            },
        )?;
        Ok(())
    }

    fn reference(
        &self,
        table: &str,
        column: &str,
        owner: &str,
        role: &str,
        name: Option<&str>,
    ) -> Result<Option<String>, StoreError> {
        let Some(name) = name else {
            return Ok(None);
        };
        let id = format!("{role}-{owner}");
        self.conn.execute(
            &format!("INSERT OR REPLACE INTO {table} (ID, {column}) VALUES (?1, ?2)"),
            params![id, name],
        )?;
        Ok(Some(id))
    }

    /// Append one play of `content_id`; returns the assigned sequence number.
    pub fn append_history(&self, content_id: &str) -> Result<i64, StoreError> {
        let next: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(rowid), 0) + 1 FROM djmdSongHistory",
            [],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO djmdSongHistory
                (ID, HistoryID, ContentID, TrackNo, UUID, usn, rb_local_usn, created_at, updated_at)
             VALUES (?1, 'h1', ?2, ?3, ?4, ?3, ?3,
                     strftime('%Y-%m-%d %H:%M:%f', 'now'), strftime('%Y-%m-%d %H:%M:%f', 'now'))",
            params![format!("sh-{next}"), content_id, next, format!("uuid-{next}")],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Append `count` plays of `content_id`.
    pub fn append_many(&self, content_id: &str, count: usize) -> Result<Vec<i64>, StoreError> {
        (0..count).map(|_| self.append_history(content_id)).collect()
    }

    pub fn history_count(&self) -> Result<i64, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT count(*) FROM djmdSongHistory", [], |row| row.get(0))?)
    }

    pub fn max_sequence(&self) -> Result<Option<i64>, StoreError> {
        Ok(self
            .conn
            .query_row(schema::SELECT_LATEST_SEQUENCE, [], |row| row.get(0))?)
    }
}

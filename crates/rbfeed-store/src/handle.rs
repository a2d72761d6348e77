use std::path::Path;

use rbfeed_core::{ConnectionParams, HistoryEntry, LogRecord, PollResult, Track, TracksPayload};
use rusqlite::{named_params, Connection, OptionalExtension};
use tracing::{debug, info, instrument, warn};

use crate::connection::{self, close_quietly};
use crate::error::StoreError;
use crate::row_helpers;
use crate::schema;

pub const DEFAULT_MAX_ROWS: u32 = 5000;
pub const DEFAULT_HISTORY_ROWS: u32 = 100;

/// Owns one connection to the library database.
///
/// Reads degrade instead of failing: a query error yields an empty result
/// with the cursor unchanged, logged at warn. Writes are refused unless the
/// handle was built mutable.
#[derive(Debug)]
pub struct StoreHandle {
    params: ConnectionParams,
    mutable: bool,
    conn: Option<Connection>,
}

impl StoreHandle {
    pub fn new(params: ConnectionParams, mutable: bool) -> Self {
        Self {
            params,
            mutable,
            conn: None,
        }
    }

    pub fn origin(&self) -> &Path {
        self.params.path()
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Connect, closing any previous connection first.
    pub fn open(&mut self) -> Result<(), StoreError> {
        self.close();
        let conn = connection::connect(&self.params, self.mutable)?;
        self.conn = Some(conn);
        info!(path = %self.origin().display(), mutable = self.mutable, "database opened");
        Ok(())
    }

    /// Release the connection. No-op when already closed.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            close_quietly(conn);
            debug!(path = %self.params.path().display(), "database closed");
        }
    }

    fn conn(&self) -> Result<&Connection, StoreError> {
        self.conn.as_ref().ok_or(StoreError::NotOpen)
    }

    /// Highest sequence number in the log; `None` when empty, closed, or on error.
    pub fn read_latest_sequence(&self) -> Option<i64> {
        let result = self.conn().and_then(|conn| {
            conn.query_row(schema::SELECT_LATEST_SEQUENCE, [], |row| row.get::<_, Option<i64>>(0))
                .map_err(StoreError::from)
        });
        match result {
            Ok(max) => max,
            Err(e) => {
                warn!(error = %e, "failed to read latest history sequence");
                None
            }
        }
    }

    /// History rows after `since`, ascending, joined with the catalog.
    #[instrument(skip(self), fields(path = %self.origin().display()))]
    pub fn try_read_new_records(
        &self,
        since: Option<i64>,
        max_rows: u32,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(schema::SELECT_NEW_HISTORY)?;
        let rows = stmt.query_map(
            named_params! { ":since": since.unwrap_or(0), ":limit": max_rows },
            row_helpers::history_entry,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Degrading form of [`Self::try_read_new_records`].
    pub fn read_new_records(&self, since: Option<i64>, max_rows: u32) -> PollResult {
        let origin = self.origin().to_path_buf();
        match self.try_read_new_records(since, max_rows) {
            Ok(entries) => PollResult::new(origin, since, entries),
            Err(e) => {
                warn!(error = %e, ?since, "history query failed, returning empty result");
                PollResult::empty(origin, since)
            }
        }
    }

    /// Catalog rows joined with reference names, capped at `max_rows`.
    #[instrument(skip(self), fields(path = %self.origin().display()))]
    pub fn try_load_tracks(&self, max_rows: u32) -> Result<Vec<Track>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(schema::SELECT_TRACKS)?;
        let rows = stmt.query_map(named_params! { ":limit": max_rows }, row_helpers::track)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Degrading form of [`Self::try_load_tracks`].
    pub fn load_tracks(&self, max_rows: u32) -> TracksPayload {
        let origin = self.origin().to_path_buf();
        match self.try_load_tracks(max_rows) {
            Ok(tracks) => TracksPayload::new(origin, tracks),
            Err(e) => {
                warn!(error = %e, "track query failed, returning empty result");
                TracksPayload::new(origin, Vec::new())
            }
        }
    }

    /// Delete the newest history record and return it as it was stored.
    ///
    /// `None` when not mutable, closed, empty, or the delete fails.
    pub fn remove_last(&mut self) -> Option<LogRecord> {
        if !self.mutable {
            debug!("remove_last refused: handle is read-only");
            return None;
        }
        let conn = self.conn.as_mut()?;
        match remove_last_in(conn) {
            Ok(record) => {
                if let Some(r) = &record {
                    info!(sequence = r.sequence, id = %r.id, "removed last history record");
                }
                record
            }
            Err(e) => {
                warn!(error = %e, "failed to remove last history record");
                None
            }
        }
    }

    /// Insert `record` with its own sequence number. Never renumbers: a
    /// sequence already in use makes the insert fail.
    pub fn insert_record(&mut self, record: &LogRecord) -> bool {
        if !self.mutable {
            debug!("insert_record refused: handle is read-only");
            return false;
        }
        let Ok(conn) = self.conn() else {
            return false;
        };
        match insert_in(conn, record) {
            Ok(()) => {
                info!(sequence = record.sequence, id = %record.id, "inserted history record");
                true
            }
            Err(e) => {
                warn!(error = %e, sequence = record.sequence, "failed to insert history record");
                false
            }
        }
    }
}

fn remove_last_in(conn: &mut Connection) -> Result<Option<LogRecord>, StoreError> {
    let tx = conn.transaction()?;
    let record = tx
        .query_row(schema::SELECT_LAST_RECORD, [], row_helpers::log_record)
        .optional()?;
    if let Some(r) = &record {
        let _ = tx.execute(schema::DELETE_RECORD, [r.sequence])?;
    }
    tx.commit()?;
    Ok(record)
}

fn insert_in(conn: &Connection, r: &LogRecord) -> Result<(), StoreError> {
    let _ = conn.execute(
        schema::INSERT_RECORD,
        named_params! {
            ":rowid": r.sequence,
            ":id": r.id,
            ":history_id": r.history_id,
            ":content_id": r.content_id,
            ":track_no": r.track_no,
            ":uuid": r.uuid,
            ":rb_data_status": r.rb_data_status,
            ":rb_local_data_status": r.rb_local_data_status,
            ":rb_local_deleted": r.rb_local_deleted,
            ":rb_local_synced": r.rb_local_synced,
            ":usn": r.usn,
            ":rb_local_usn": r.rb_local_usn,
            ":created_at": r.created_at,
            ":updated_at": r.updated_at,
        },
    )?;
    Ok(())
}

impl Drop for StoreHandle {
    fn drop(&mut self) {
        self.close();
    }
}

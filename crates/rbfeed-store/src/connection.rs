//! Opening the encrypted database.

use std::time::Duration;

use rbfeed_core::ConnectionParams;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::schema;

/// How long a statement waits for the external writer's lock.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open and key a connection to an existing database.
///
/// Read-only unless `mutable`; never creates the file. A rejected key is
/// detected by a verification query, and the connection is closed before
/// the error is returned.
pub fn connect(params: &ConnectionParams, mutable: bool) -> Result<Connection, StoreError> {
    let path = params.path();
    if !path.exists() {
        return Err(StoreError::NotFound(path.to_path_buf()));
    }

    let mode = if mutable {
        OpenFlags::SQLITE_OPEN_READ_WRITE
    } else {
        OpenFlags::SQLITE_OPEN_READ_ONLY
    };
    let conn = Connection::open_with_flags(path, mode | OpenFlags::SQLITE_OPEN_NO_MUTEX)?;

    conn.pragma_update(None, "key", params.credential())?;

    if let Err(e) = conn.query_row(schema::VERIFY_KEY, [], |row| row.get::<_, i64>(0)) {
        debug!(error = %e, "key verification failed");
        close_quietly(conn);
        return Err(StoreError::AuthenticationFailed(path.to_path_buf()));
    }

    // See the external writer's WAL commits instead of a stale snapshot.
    conn.pragma_update(None, "read_uncommitted", true)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;

    Ok(conn)
}

/// Close a connection, logging instead of returning a failure.
pub fn close_quietly(conn: Connection) {
    if let Err((_, e)) = conn.close() {
        warn!(error = %e, "ignoring error while closing database");
    }
}

//! PRAGMA configuration applied to every connection.
//!
//! WAL mode, NORMAL sync, 5s busy_timeout, foreign_keys ON.

use rusqlite::Connection;

use quarry_core::errors::{storage_error::to_storage_err, QuarryResult};

/// Apply performance and safety pragmas to a write connection.
pub fn apply_pragmas(conn: &Connection) -> QuarryResult<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        PRAGMA foreign_keys = ON;
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Read connections skip the journal-mode switch (read-only handles can't
/// change it) but keep the busy timeout.
pub fn apply_read_pragmas(conn: &Connection) -> QuarryResult<()> {
    conn.execute_batch("PRAGMA busy_timeout = 5000;")
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

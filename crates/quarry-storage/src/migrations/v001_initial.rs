//! v1: the collections registry.

use rusqlite::Connection;

use quarry_core::errors::{storage_error::to_storage_err, QuarryResult};

pub fn up(conn: &Connection) -> QuarryResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            schema_version INTEGER NOT NULL DEFAULT 1,
            config TEXT NOT NULL DEFAULT '{}'
        );",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

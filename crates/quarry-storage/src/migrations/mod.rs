//! Versioned schema migrations. The version counter is linear; each step
//! runs inside one transaction and never drops data.

pub mod v001_initial;
pub mod v002_embeddings;

use rusqlite::Connection;
use tracing::info;

use quarry_core::errors::{storage_error::to_storage_err, QuarryResult, StorageError};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 2;

/// Bring a database up to `SCHEMA_VERSION`.
pub fn run_migrations(conn: &Connection) -> QuarryResult<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_meta (version INTEGER NOT NULL)")
        .map_err(|e| to_storage_err(e.to_string()))?;

    let current: u32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_meta", [], |r| {
            r.get(0)
        })
        .map_err(|e| to_storage_err(e.to_string()))?;

    for version in (current + 1)..=SCHEMA_VERSION {
        apply(conn, version)?;
        info!(version, "schema migration applied");
    }
    Ok(())
}

fn apply(conn: &Connection, version: u32) -> QuarryResult<()> {
    conn.execute_batch("BEGIN")
        .map_err(|e| to_storage_err(e.to_string()))?;

    let result = match version {
        1 => v001_initial::up(conn),
        2 => v002_embeddings::up(conn),
        other => Err(StorageError::MigrationFailed {
            version: other,
            reason: "unknown schema version".to_string(),
        }
        .into()),
    }
    .and_then(|()| {
        conn.execute(
            "INSERT INTO schema_meta (version) VALUES (?1)",
            [version],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
        Ok(())
    });

    match result {
        Ok(()) => conn
            .execute_batch("COMMIT")
            .map_err(|e| to_storage_err(e.to_string()).into()),
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(StorageError::MigrationFailed {
                version,
                reason: e.to_string(),
            }
            .into())
        }
    }
}

//! The single write connection. All mutating SQL goes through here, one
//! operation at a time.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use quarry_core::errors::{storage_error::to_storage_err, QuarryResult, StorageError};

use super::pragmas::apply_pragmas;

pub struct WriteConnection {
    conn: Mutex<Connection>,
}

impl WriteConnection {
    pub fn open(path: &Path) -> QuarryResult<Self> {
        let conn = Connection::open(path).map_err(|e| to_storage_err(e.to_string()))?;
        apply_pragmas(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> QuarryResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| to_storage_err(e.to_string()))?;
        apply_pragmas(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run a closure holding the write lock.
    pub fn with_conn<F, T>(&self, f: F) -> QuarryResult<T>
    where
        F: FnOnce(&Connection) -> QuarryResult<T>,
    {
        let guard = self.conn.lock().map_err(|_| StorageError::PoolPoisoned)?;
        f(&guard)
    }

    /// Run a closure inside a transaction. Rolls back on error.
    pub fn with_txn<F, T>(&self, f: F) -> QuarryResult<T>
    where
        F: FnOnce(&Connection) -> QuarryResult<T>,
    {
        let guard = self.conn.lock().map_err(|_| StorageError::PoolPoisoned)?;
        guard
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| to_storage_err(e.to_string()))?;
        match f(&guard) {
            Ok(value) => {
                guard
                    .execute_batch("COMMIT")
                    .map_err(|e| to_storage_err(e.to_string()))?;
                Ok(value)
            }
            Err(e) => {
                let _ = guard.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }
}

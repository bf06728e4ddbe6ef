//! Connection pool: one mutex-guarded write connection, several read-only
//! connections. Reads are concurrent under WAL; writes are single-writer
//! by construction.

pub mod pragmas;
pub mod read_pool;
pub mod write_connection;

use std::path::{Path, PathBuf};

use quarry_core::errors::QuarryResult;

pub use read_pool::ReadPool;
pub use write_connection::WriteConnection;

/// The engine's connection set. In-memory mode has no read pool: separate
/// in-memory connections would see separate databases, so reads are routed
/// through the writer instead.
pub struct ConnectionPool {
    pub writer: WriteConnection,
    pub readers: Option<ReadPool>,
    pub db_path: Option<PathBuf>,
}

impl ConnectionPool {
    pub fn open(path: &Path, read_pool_size: usize) -> QuarryResult<Self> {
        let writer = WriteConnection::open(path)?;
        let readers = ReadPool::open(path, read_pool_size)?;
        Ok(Self {
            writer,
            readers: Some(readers),
            db_path: Some(path.to_path_buf()),
        })
    }

    /// In-memory pool for tests.
    pub fn open_in_memory() -> QuarryResult<Self> {
        Ok(Self {
            writer: WriteConnection::open_in_memory()?,
            readers: None,
            db_path: None,
        })
    }

    /// Run a read closure on a pooled reader, or on the writer when no
    /// pool exists (in-memory mode).
    pub fn with_read<F, T>(&self, f: F) -> QuarryResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> QuarryResult<T>,
    {
        match &self.readers {
            Some(pool) => pool.with_conn(f),
            None => self.writer.with_conn(f),
        }
    }
}

/// Storage-layer errors for SQLite operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    Sqlite { message: String },

    #[error("migration failed at version {version}: {reason}")]
    MigrationFailed { version: u32, reason: String },

    #[error("collection not found: {name}")]
    CollectionNotFound { name: String },

    #[error("collection already exists: {name}")]
    CollectionExists { name: String },

    #[error("connection pool lock poisoned")]
    PoolPoisoned,
}

/// Convert a raw SQLite message into a `StorageError`.
pub fn to_storage_err(message: impl Into<String>) -> StorageError {
    StorageError::Sqlite {
        message: message.into(),
    }
}

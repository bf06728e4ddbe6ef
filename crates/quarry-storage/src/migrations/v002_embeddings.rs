//! v2: embedding support. Adds embedding columns to `collections` plus the
//! queue and tier-3 cache tables. Additive only.

use rusqlite::Connection;

use quarry_core::errors::{storage_error::to_storage_err, QuarryResult};

pub fn up(conn: &Connection) -> QuarryResult<()> {
    conn.execute_batch(
        "ALTER TABLE collections ADD COLUMN embedding_provider TEXT NOT NULL DEFAULT '';
         ALTER TABLE collections ADD COLUMN embedding_model TEXT NOT NULL DEFAULT '';
         ALTER TABLE collections ADD COLUMN embedding_dimensions INTEGER NOT NULL DEFAULT 0;
         ALTER TABLE collections ADD COLUMN embedding_status TEXT NOT NULL DEFAULT 'enabled';
         ALTER TABLE collections ADD COLUMN processing_status TEXT NOT NULL DEFAULT 'idle';

         CREATE TABLE IF NOT EXISTS embedding_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            document_id TEXT NOT NULL,
            text_content TEXT NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            enqueued_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            not_before TEXT,
            error_message TEXT
         );
         CREATE INDEX IF NOT EXISTS idx_queue_reserve
            ON embedding_queue (status, priority DESC, enqueued_at ASC);

         CREATE TABLE IF NOT EXISTS embedding_cache (
            key TEXT PRIMARY KEY,
            embedding BLOB NOT NULL,
            provider TEXT NOT NULL,
            model TEXT NOT NULL,
            dimensions INTEGER NOT NULL,
            compressed INTEGER NOT NULL DEFAULT 0,
            tags TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            expires_at TEXT,
            last_used_at TEXT NOT NULL,
            hit_count INTEGER NOT NULL DEFAULT 0
         );
         CREATE INDEX IF NOT EXISTS idx_cache_expiry ON embedding_cache (expires_at);",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

//! StorageEngine: owns the connection pool, runs migrations, implements
//! the `DocumentStorage` trait. Single writer, pooled readers.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use quarry_core::errors::{QuarryResult, StorageError};
use quarry_core::models::{
    BatchInsertReport, CacheRecord, Collection, Document, EmbeddingRecord, FtsHit, KnnHit,
    NewQueueItem, ProcessingStatus, QueueItem, QueueItemStatus, QueueStatusReport,
};
use quarry_core::traits::DocumentStorage;

use crate::migrations;
use crate::pool::ConnectionPool;
use crate::queries::{cache, collections, documents, fts, queue, vector};

/// FTS rows sync in chunks this size, each in its own transaction, after
/// the document rows have committed. Keeps FTS memory bounded on large
/// batches and never rolls documents back on index failure.
const FTS_SYNC_BATCH: usize = 32;

const DEFAULT_READ_POOL_SIZE: usize = 4;

pub struct StorageEngine {
    pool: ConnectionPool,
}

impl StorageEngine {
    /// Open (or create) a database file and bring it to the current
    /// schema version.
    pub fn open(path: &Path) -> QuarryResult<Self> {
        let pool = ConnectionPool::open(path, DEFAULT_READ_POOL_SIZE)?;
        pool.writer.with_conn(migrations::run_migrations)?;
        Ok(Self { pool })
    }

    /// In-memory engine for tests.
    pub fn open_in_memory() -> QuarryResult<Self> {
        let pool = ConnectionPool::open_in_memory()?;
        pool.writer.with_conn(migrations::run_migrations)?;
        Ok(Self { pool })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.pool.db_path.as_deref()
    }

    fn collection_dims(&self, name: &str) -> QuarryResult<usize> {
        let collection = self
            .get_collection(name)?
            .ok_or_else(|| StorageError::CollectionNotFound {
                name: name.to_string(),
            })?;
        Ok(collection.embedding.dimensions)
    }
}

impl DocumentStorage for StorageEngine {
    fn create_collection(&self, collection: &Collection) -> QuarryResult<()> {
        Collection::validate_name(&collection.name)?;
        self.pool
            .writer
            .with_txn(|conn| collections::create_collection(conn, collection))
    }

    fn get_collection(&self, name: &str) -> QuarryResult<Option<Collection>> {
        self.pool.with_read(|conn| collections::get_collection(conn, name))
    }

    fn list_collections(&self) -> QuarryResult<Vec<Collection>> {
        self.pool.with_read(collections::list_collections)
    }

    fn set_processing_status(&self, name: &str, status: ProcessingStatus) -> QuarryResult<()> {
        self.pool
            .writer
            .with_conn(|conn| collections::set_processing_status(conn, name, status))
    }

    fn count_documents(&self, collection: &str) -> QuarryResult<usize> {
        Collection::validate_name(collection)?;
        self.pool
            .with_read(|conn| documents::count_documents(conn, collection))
    }

    fn insert_document(&self, doc: &Document) -> QuarryResult<()> {
        Collection::validate_name(&doc.collection)?;
        self.pool.writer.with_txn(|conn| {
            let rowid = documents::upsert_document_row(conn, doc)?;
            let metadata = serde_json::to_string(&doc.metadata).unwrap_or_else(|_| "{}".into());
            fts::insert_fts_row(
                conn,
                &doc.collection,
                rowid,
                doc.title.as_deref().unwrap_or(""),
                doc.content.as_deref().unwrap_or(""),
                &metadata,
            )
        })
    }

    fn insert_documents(&self, docs: &[Document]) -> QuarryResult<BatchInsertReport> {
        let mut report = BatchInsertReport::default();
        if docs.is_empty() {
            return Ok(report);
        }
        for doc in docs {
            Collection::validate_name(&doc.collection)?;
        }

        // Phase 1: document rows, one transaction, committed before any
        // FTS work begins.
        let pending_fts: Vec<(String, i64, String, String, String)> =
            self.pool.writer.with_txn(|conn| {
                let mut rows = Vec::with_capacity(docs.len());
                for doc in docs {
                    let rowid = documents::upsert_document_row(conn, doc)?;
                    let metadata =
                        serde_json::to_string(&doc.metadata).unwrap_or_else(|_| "{}".into());
                    rows.push((
                        doc.collection.clone(),
                        rowid,
                        doc.title.clone().unwrap_or_default(),
                        doc.content.clone().unwrap_or_default(),
                        metadata,
                    ));
                }
                Ok(rows)
            })?;
        report.inserted = pending_fts.len();

        // Phase 2: FTS sync in sub-batches, separate transactions. A
        // failed sub-batch leaves its documents unindexed and is reported
        // as a warning; the documents themselves stay committed.
        for chunk in pending_fts.chunks(FTS_SYNC_BATCH) {
            let synced = self.pool.writer.with_txn(|conn| {
                for (collection, rowid, title, content, metadata) in chunk {
                    fts::insert_fts_row(conn, collection, *rowid, title, content, metadata)?;
                }
                Ok(chunk.len())
            });
            match synced {
                Ok(n) => report.fts_synced += n,
                Err(e) => {
                    warn!(error = %e, chunk = chunk.len(), "FTS sub-batch sync failed");
                    report
                        .warnings
                        .push(format!("FTS sync failed for {} documents: {e}", chunk.len()));
                }
            }
        }

        debug!(
            inserted = report.inserted,
            fts_synced = report.fts_synced,
            "batch insert complete"
        );
        Ok(report)
    }

    fn get_document(&self, collection: &str, id: &str) -> QuarryResult<Option<Document>> {
        Collection::validate_name(collection)?;
        self.pool
            .with_read(|conn| documents::get_document(conn, collection, id))
    }

    fn delete_document(&self, collection: &str, id: &str) -> QuarryResult<bool> {
        Collection::validate_name(collection)?;
        let dims = self.collection_dims(collection)?;
        self.pool.writer.with_txn(|conn| {
            let removed = documents::delete_document_row(conn, collection, id)?;
            if removed {
                vector::delete_embedding(conn, collection, dims, id)?;
                conn.execute(
                    "DELETE FROM embedding_queue WHERE collection = ?1 AND document_id = ?2",
                    rusqlite::params![collection, id],
                )
                .map_err(|e| {
                    quarry_core::errors::storage_error::to_storage_err(e.to_string())
                })?;
            }
            Ok(removed)
        })
    }

    fn clear_documents(&self, collection: &str) -> QuarryResult<usize> {
        Collection::validate_name(collection)?;
        let dims = self.collection_dims(collection)?;
        self.pool.writer.with_txn(|conn| {
            let count = documents::count_documents(conn, collection)?;
            fts::delete_all_fts(conn, collection)?;
            let docs = crate::queries::docs_table(collection);
            let vec = crate::queries::vec_table(collection, dims);
            conn.execute_batch(&format!(
                "DELETE FROM {docs};
                 DELETE FROM {vec};"
            ))
            .map_err(|e| quarry_core::errors::storage_error::to_storage_err(e.to_string()))?;
            conn.execute(
                "DELETE FROM embedding_queue WHERE collection = ?1",
                rusqlite::params![collection],
            )
            .map_err(|e| quarry_core::errors::storage_error::to_storage_err(e.to_string()))?;
            Ok(count)
        })
    }

    fn search_fts(
        &self,
        collection: &str,
        match_expr: &str,
        limit: usize,
    ) -> QuarryResult<Vec<FtsHit>> {
        Collection::validate_name(collection)?;
        if limit == 0 || match_expr.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.pool
            .with_read(|conn| fts::search_fts(conn, collection, match_expr, limit))
    }

    fn search_knn(&self, collection: &str, query: &[f32], k: usize) -> QuarryResult<Vec<KnnHit>> {
        Collection::validate_name(collection)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let dims = self.collection_dims(collection)?;
        self.pool
            .with_read(|conn| vector::search_knn(conn, collection, dims, query, k))
    }

    fn store_embedding(&self, collection: &str, record: &EmbeddingRecord) -> QuarryResult<()> {
        Collection::validate_name(collection)?;
        let dims = self.collection_dims(collection)?;
        self.pool
            .writer
            .with_conn(|conn| vector::store_embedding(conn, collection, dims, record))
    }

    fn get_embedding(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> QuarryResult<Option<EmbeddingRecord>> {
        Collection::validate_name(collection)?;
        let dims = self.collection_dims(collection)?;
        self.pool
            .with_read(|conn| vector::get_embedding(conn, collection, dims, doc_id))
    }

    fn has_vector_index(&self, collection: &str) -> QuarryResult<bool> {
        Collection::validate_name(collection)?;
        let Some(coll) = self.get_collection(collection)? else {
            return Ok(false);
        };
        self.pool.with_read(|conn| {
            vector::has_vector_table(conn, collection, coll.embedding.dimensions)
        })
    }

    fn cache_get(&self, key: &str, now: DateTime<Utc>) -> QuarryResult<Option<CacheRecord>> {
        // Hits bump usage counters, so this goes through the writer.
        self.pool.writer.with_conn(|conn| cache::cache_get(conn, key, now))
    }

    fn cache_put(&self, record: &CacheRecord) -> QuarryResult<()> {
        self.pool.writer.with_conn(|conn| cache::cache_put(conn, record))
    }

    fn cache_invalidate(&self, pattern: &str) -> QuarryResult<usize> {
        self.pool
            .writer
            .with_conn(|conn| cache::cache_invalidate(conn, pattern))
    }

    fn cache_trim_expired(&self, now: DateTime<Utc>) -> QuarryResult<usize> {
        self.pool
            .writer
            .with_conn(|conn| cache::cache_trim_expired(conn, now))
    }

    fn enqueue(&self, item: &NewQueueItem) -> QuarryResult<i64> {
        Collection::validate_name(&item.collection)?;
        self.pool
            .writer
            .with_conn(|conn| queue::enqueue(conn, item, Utc::now()))
    }

    fn reserve(&self, batch_size: usize, now: DateTime<Utc>) -> QuarryResult<Vec<QueueItem>> {
        if batch_size == 0 {
            return Ok(Vec::new());
        }
        self.pool
            .writer
            .with_txn(|conn| queue::reserve(conn, batch_size, now))
    }

    fn complete_item(&self, id: i64, now: DateTime<Utc>) -> QuarryResult<()> {
        self.pool
            .writer
            .with_txn(|conn| queue::complete(conn, id, now))
    }

    fn fail_item(
        &self,
        id: i64,
        error: &str,
        max_attempts: u32,
        backoff_base_ms: u64,
        now: DateTime<Utc>,
    ) -> QuarryResult<QueueItemStatus> {
        self.pool
            .writer
            .with_txn(|conn| queue::fail(conn, id, error, max_attempts, backoff_base_ms, now))
    }

    fn sweep_stale(
        &self,
        visibility_timeout_secs: u64,
        now: DateTime<Utc>,
    ) -> QuarryResult<usize> {
        self.pool
            .writer
            .with_txn(|conn| queue::sweep_stale(conn, visibility_timeout_secs, now))
    }

    fn queue_status(
        &self,
        collection: Option<&str>,
        now: DateTime<Utc>,
    ) -> QuarryResult<QueueStatusReport> {
        self.pool
            .with_read(|conn| queue::status(conn, collection, now))
    }

    fn clear_queue(&self, collection: Option<&str>, force: bool) -> QuarryResult<usize> {
        self.pool
            .writer
            .with_conn(|conn| queue::clear(conn, collection, force))
    }
}

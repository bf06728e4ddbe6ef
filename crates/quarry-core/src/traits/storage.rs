use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::errors::QuarryResult;
use crate::models::{
    BatchInsertReport, CacheRecord, Collection, Document, EmbeddingRecord, FtsHit, KnnHit,
    NewQueueItem, ProcessingStatus, QueueItem, QueueItemStatus, QueueStatusReport,
};

/// The narrow SQL-collaborator surface: collections + documents + FTS +
/// KNN + tier-3 cache + queue. Implemented by the storage engine; every
/// consumer above it depends only on this trait.
pub trait DocumentStorage: Send + Sync {
    // --- Collections ---
    fn create_collection(&self, collection: &Collection) -> QuarryResult<()>;
    fn get_collection(&self, name: &str) -> QuarryResult<Option<Collection>>;
    fn list_collections(&self) -> QuarryResult<Vec<Collection>>;
    fn set_processing_status(&self, name: &str, status: ProcessingStatus) -> QuarryResult<()>;
    fn count_documents(&self, collection: &str) -> QuarryResult<usize>;

    // --- Documents ---
    fn insert_document(&self, doc: &Document) -> QuarryResult<()>;
    /// Documents commit first; FTS rows sync afterwards in sub-batches in
    /// separate transactions. Partial FTS failure surfaces in the report.
    fn insert_documents(&self, docs: &[Document]) -> QuarryResult<BatchInsertReport>;
    fn get_document(&self, collection: &str, id: &str) -> QuarryResult<Option<Document>>;
    /// Removes the document plus its FTS row, embedding, and queued work.
    fn delete_document(&self, collection: &str, id: &str) -> QuarryResult<bool>;
    /// Collection-scoped wipe inside one transaction (the `clear` RPC).
    fn clear_documents(&self, collection: &str) -> QuarryResult<usize>;

    // --- Search ---
    fn search_fts(
        &self,
        collection: &str,
        match_expr: &str,
        limit: usize,
    ) -> QuarryResult<Vec<FtsHit>>;
    /// Cosine similarity KNN: higher = closer; results sorted descending.
    fn search_knn(&self, collection: &str, query: &[f32], k: usize) -> QuarryResult<Vec<KnnHit>>;

    // --- Embeddings ---
    fn store_embedding(&self, collection: &str, record: &EmbeddingRecord) -> QuarryResult<()>;
    fn get_embedding(&self, collection: &str, doc_id: &str) -> QuarryResult<Option<EmbeddingRecord>>;
    fn has_vector_index(&self, collection: &str) -> QuarryResult<bool>;

    // --- Tier-3 embedding cache ---
    fn cache_get(&self, key: &str, now: DateTime<Utc>) -> QuarryResult<Option<CacheRecord>>;
    fn cache_put(&self, record: &CacheRecord) -> QuarryResult<()>;
    /// Pattern shapes: exact key, glob (`*`), `tag:<label>`.
    fn cache_invalidate(&self, pattern: &str) -> QuarryResult<usize>;
    fn cache_trim_expired(&self, now: DateTime<Utc>) -> QuarryResult<usize>;

    // --- Queue ---
    fn enqueue(&self, item: &NewQueueItem) -> QuarryResult<i64>;
    /// Transactional reservation: up to `batch_size` items by
    /// `(priority desc, enqueued_at asc)`, flipped to `processing`.
    fn reserve(&self, batch_size: usize, now: DateTime<Utc>) -> QuarryResult<Vec<QueueItem>>;
    fn complete_item(&self, id: i64, now: DateTime<Utc>) -> QuarryResult<()>;
    /// Records a failure; reschedules with exponential backoff while
    /// `attempts < max_attempts`, otherwise marks `failed`. Returns the
    /// resulting status.
    fn fail_item(
        &self,
        id: i64,
        error: &str,
        max_attempts: u32,
        backoff_base_ms: u64,
        now: DateTime<Utc>,
    ) -> QuarryResult<QueueItemStatus>;
    /// Returns stale `processing` reservations to `pending` with
    /// `attempts + 1`.
    fn sweep_stale(&self, visibility_timeout_secs: u64, now: DateTime<Utc>) -> QuarryResult<usize>;
    fn queue_status(
        &self,
        collection: Option<&str>,
        now: DateTime<Utc>,
    ) -> QuarryResult<QueueStatusReport>;
    /// Refuses `processing` items unless `force` is set.
    fn clear_queue(&self, collection: Option<&str>, force: bool) -> QuarryResult<usize>;
}

/// Blanket impl: `Arc<T>` implements `DocumentStorage` by delegating to the
/// inner `T`, so `Arc<StorageEngine>` can be used wherever
/// `&dyn DocumentStorage` is needed.
impl<T: DocumentStorage> DocumentStorage for Arc<T> {
    fn create_collection(&self, collection: &Collection) -> QuarryResult<()> { (**self).create_collection(collection) }
    fn get_collection(&self, name: &str) -> QuarryResult<Option<Collection>> { (**self).get_collection(name) }
    fn list_collections(&self) -> QuarryResult<Vec<Collection>> { (**self).list_collections() }
    fn set_processing_status(&self, name: &str, status: ProcessingStatus) -> QuarryResult<()> { (**self).set_processing_status(name, status) }
    fn count_documents(&self, collection: &str) -> QuarryResult<usize> { (**self).count_documents(collection) }
    fn insert_document(&self, doc: &Document) -> QuarryResult<()> { (**self).insert_document(doc) }
    fn insert_documents(&self, docs: &[Document]) -> QuarryResult<BatchInsertReport> { (**self).insert_documents(docs) }
    fn get_document(&self, collection: &str, id: &str) -> QuarryResult<Option<Document>> { (**self).get_document(collection, id) }
    fn delete_document(&self, collection: &str, id: &str) -> QuarryResult<bool> { (**self).delete_document(collection, id) }
    fn clear_documents(&self, collection: &str) -> QuarryResult<usize> { (**self).clear_documents(collection) }
    fn search_fts(&self, collection: &str, match_expr: &str, limit: usize) -> QuarryResult<Vec<FtsHit>> { (**self).search_fts(collection, match_expr, limit) }
    fn search_knn(&self, collection: &str, query: &[f32], k: usize) -> QuarryResult<Vec<KnnHit>> { (**self).search_knn(collection, query, k) }
    fn store_embedding(&self, collection: &str, record: &EmbeddingRecord) -> QuarryResult<()> { (**self).store_embedding(collection, record) }
    fn get_embedding(&self, collection: &str, doc_id: &str) -> QuarryResult<Option<EmbeddingRecord>> { (**self).get_embedding(collection, doc_id) }
    fn has_vector_index(&self, collection: &str) -> QuarryResult<bool> { (**self).has_vector_index(collection) }
    fn cache_get(&self, key: &str, now: DateTime<Utc>) -> QuarryResult<Option<CacheRecord>> { (**self).cache_get(key, now) }
    fn cache_put(&self, record: &CacheRecord) -> QuarryResult<()> { (**self).cache_put(record) }
    fn cache_invalidate(&self, pattern: &str) -> QuarryResult<usize> { (**self).cache_invalidate(pattern) }
    fn cache_trim_expired(&self, now: DateTime<Utc>) -> QuarryResult<usize> { (**self).cache_trim_expired(now) }
    fn enqueue(&self, item: &NewQueueItem) -> QuarryResult<i64> { (**self).enqueue(item) }
    fn reserve(&self, batch_size: usize, now: DateTime<Utc>) -> QuarryResult<Vec<QueueItem>> { (**self).reserve(batch_size, now) }
    fn complete_item(&self, id: i64, now: DateTime<Utc>) -> QuarryResult<()> { (**self).complete_item(id, now) }
    fn fail_item(&self, id: i64, error: &str, max_attempts: u32, backoff_base_ms: u64, now: DateTime<Utc>) -> QuarryResult<QueueItemStatus> { (**self).fail_item(id, error, max_attempts, backoff_base_ms, now) }
    fn sweep_stale(&self, visibility_timeout_secs: u64, now: DateTime<Utc>) -> QuarryResult<usize> { (**self).sweep_stale(visibility_timeout_secs, now) }
    fn queue_status(&self, collection: Option<&str>, now: DateTime<Utc>) -> QuarryResult<QueueStatusReport> { (**self).queue_status(collection, now) }
    fn clear_queue(&self, collection: Option<&str>, force: bool) -> QuarryResult<usize> { (**self).clear_queue(collection, force) }
}

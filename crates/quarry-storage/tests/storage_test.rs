//! Integration tests for the storage engine: collections, documents, FTS,
//! vectors, tier-3 cache, and the embedding queue.

use chrono::Utc;
use serde_json::json;

use quarry_core::config::CollectionEmbeddingConfig;
use quarry_core::models::{
    CacheRecord, Collection, Document, EmbeddingRecord, NewQueueItem, QueueItemStatus,
};
use quarry_core::traits::DocumentStorage;
use quarry_storage::StorageEngine;

fn engine_with_collection(name: &str, dims: usize) -> StorageEngine {
    let engine = StorageEngine::open_in_memory().unwrap();
    let embedding = CollectionEmbeddingConfig {
        dimensions: dims,
        ..CollectionEmbeddingConfig::default()
    };
    engine
        .create_collection(&Collection::new(name, embedding).unwrap())
        .unwrap();
    engine
}

fn doc(collection: &str, id: &str, title: &str, content: &str) -> Document {
    Document::new(
        collection,
        id,
        Some(title.to_string()),
        Some(content.to_string()),
        json!({}),
    )
    .unwrap()
}

#[test]
fn collection_lifecycle() {
    let engine = engine_with_collection("docs", 4);
    let loaded = engine.get_collection("docs").unwrap().unwrap();
    assert_eq!(loaded.name, "docs");
    assert_eq!(loaded.embedding.dimensions, 4);
    assert_eq!(engine.list_collections().unwrap().len(), 1);

    // Duplicate creation is rejected.
    let again = Collection::new("docs", CollectionEmbeddingConfig::default()).unwrap();
    assert!(engine.create_collection(&again).is_err());

    // Invalid names never reach the per-collection SQL.
    assert!(engine.count_documents("bad name").is_err());
}

#[test]
fn insert_and_fts_search() {
    let engine = engine_with_collection("docs", 4);
    engine
        .insert_document(&doc("docs", "a", "greeting", "hello world"))
        .unwrap();
    engine
        .insert_document(&doc("docs", "b", "farewell", "goodbye world"))
        .unwrap();

    let hits = engine.search_fts("docs", "\"hello\"", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].doc_id, "a");
    assert!(hits[0].score > 0.0, "bm25 is negated to higher-is-better");

    let both = engine.search_fts("docs", "\"world\"", 10).unwrap();
    assert_eq!(both.len(), 2);
}

#[test]
fn upsert_replaces_fts_entry() {
    let engine = engine_with_collection("docs", 4);
    engine
        .insert_document(&doc("docs", "a", "old", "alpha text"))
        .unwrap();
    engine
        .insert_document(&doc("docs", "a", "new", "beta text"))
        .unwrap();

    assert!(engine.search_fts("docs", "\"alpha\"", 10).unwrap().is_empty());
    let hits = engine.search_fts("docs", "\"beta\"", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(engine.count_documents("docs").unwrap(), 1);
}

#[test]
fn batch_insert_syncs_fts_in_subbatches() {
    let engine = engine_with_collection("docs", 4);
    let docs: Vec<Document> = (0..80)
        .map(|i| doc("docs", &format!("d{i}"), "bulk", &format!("document number {i}")))
        .collect();

    let report = engine.insert_documents(&docs).unwrap();
    assert_eq!(report.inserted, 80);
    assert_eq!(report.fts_synced, 80);
    assert!(report.warnings.is_empty());
    assert_eq!(engine.count_documents("docs").unwrap(), 80);

    let hits = engine.search_fts("docs", "\"bulk\"", 100).unwrap();
    assert_eq!(hits.len(), 80);
}

#[test]
fn knn_orders_by_cosine_similarity() {
    let engine = engine_with_collection("docs", 4);
    engine.insert_document(&doc("docs", "a", "a", "a")).unwrap();
    engine.insert_document(&doc("docs", "b", "b", "b")).unwrap();

    engine
        .store_embedding(
            "docs",
            &EmbeddingRecord::new("a", vec![1.0, 0.0, 0.0, 0.0], "local-hash", "m", "h1"),
        )
        .unwrap();
    engine
        .store_embedding(
            "docs",
            &EmbeddingRecord::new("b", vec![0.0, 1.0, 0.0, 0.0], "local-hash", "m", "h2"),
        )
        .unwrap();

    let hits = engine
        .search_knn("docs", &[1.0, 0.0, 0.0, 0.0], 2)
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].doc_id, "a");
    assert!((hits[0].similarity - 1.0).abs() < 1e-9);
    assert!(hits[1].similarity.abs() < 1e-9);

    // k bounds the result set.
    assert_eq!(engine.search_knn("docs", &[1.0, 0.0, 0.0, 0.0], 1).unwrap().len(), 1);
    // Zero k is an empty result, not an error.
    assert!(engine.search_knn("docs", &[1.0, 0.0, 0.0, 0.0], 0).unwrap().is_empty());
}

#[test]
fn embedding_upsert_keeps_one_current_record() {
    let engine = engine_with_collection("docs", 4);
    engine.insert_document(&doc("docs", "a", "a", "a")).unwrap();
    engine
        .store_embedding(
            "docs",
            &EmbeddingRecord::new("a", vec![1.0, 0.0, 0.0, 0.0], "local-hash", "m", "h1"),
        )
        .unwrap();
    engine
        .store_embedding(
            "docs",
            &EmbeddingRecord::new("a", vec![0.0, 0.0, 0.0, 1.0], "local-hash", "m", "h2"),
        )
        .unwrap();

    let current = engine.get_embedding("docs", "a").unwrap().unwrap();
    assert_eq!(current.content_hash, "h2");
    assert_eq!(current.vector, vec![0.0, 0.0, 0.0, 1.0]);
}

#[test]
fn delete_document_cascades() {
    let engine = engine_with_collection("docs", 4);
    engine
        .insert_document(&doc("docs", "a", "title", "searchable content"))
        .unwrap();
    engine
        .store_embedding(
            "docs",
            &EmbeddingRecord::new("a", vec![1.0, 0.0, 0.0, 0.0], "local-hash", "m", "h"),
        )
        .unwrap();
    engine
        .enqueue(&NewQueueItem {
            collection: "docs".into(),
            document_id: "a".into(),
            text: "searchable content".into(),
            priority: 0,
        })
        .unwrap();

    assert!(engine.delete_document("docs", "a").unwrap());
    assert!(engine.get_document("docs", "a").unwrap().is_none());
    assert!(engine.get_embedding("docs", "a").unwrap().is_none());
    assert!(engine.search_fts("docs", "\"searchable\"", 10).unwrap().is_empty());
    let status = engine.queue_status(Some("docs"), Utc::now()).unwrap();
    assert_eq!(status.pending, 0);

    // Unknown ids report false, not an error.
    assert!(!engine.delete_document("docs", "missing").unwrap());
}

#[test]
fn clear_documents_wipes_collection_scope() {
    let engine = engine_with_collection("docs", 4);
    for i in 0..5 {
        engine
            .insert_document(&doc("docs", &format!("d{i}"), "t", "clearable text"))
            .unwrap();
    }
    let cleared = engine.clear_documents("docs").unwrap();
    assert_eq!(cleared, 5);
    assert_eq!(engine.count_documents("docs").unwrap(), 0);
    assert!(engine.search_fts("docs", "\"clearable\"", 10).unwrap().is_empty());
}

#[test]
fn queue_reserve_orders_by_priority_then_age() {
    let engine = engine_with_collection("docs", 4);
    let low = engine
        .enqueue(&NewQueueItem {
            collection: "docs".into(),
            document_id: "low".into(),
            text: "t".into(),
            priority: 1,
        })
        .unwrap();
    let high = engine
        .enqueue(&NewQueueItem {
            collection: "docs".into(),
            document_id: "high".into(),
            text: "t".into(),
            priority: 9,
        })
        .unwrap();

    let reserved = engine.reserve(10, Utc::now()).unwrap();
    assert_eq!(reserved.len(), 2);
    assert_eq!(reserved[0].id, high, "higher priority reserves first");
    assert_eq!(reserved[1].id, low);
    assert!(reserved
        .iter()
        .all(|i| i.status == QueueItemStatus::Processing && i.attempts == 1));

    // Reserved items are invisible to the next reservation.
    assert!(engine.reserve(10, Utc::now()).unwrap().is_empty());
}

#[test]
fn queue_retry_then_exhaustion() {
    let engine = engine_with_collection("docs", 4);
    let id = engine
        .enqueue(&NewQueueItem {
            collection: "docs".into(),
            document_id: "x".into(),
            text: "t".into(),
            priority: 0,
        })
        .unwrap();

    // Attempt 1 fails; with zero backoff it is immediately reservable.
    engine.reserve(1, Utc::now()).unwrap();
    let status = engine.fail_item(id, "network", 3, 0, Utc::now()).unwrap();
    assert_eq!(status, QueueItemStatus::Pending);

    // Attempt 2 fails.
    engine.reserve(1, Utc::now()).unwrap();
    let status = engine.fail_item(id, "network", 3, 0, Utc::now()).unwrap();
    assert_eq!(status, QueueItemStatus::Pending);

    // Attempt 3 fails; attempts are exhausted.
    engine.reserve(1, Utc::now()).unwrap();
    let status = engine.fail_item(id, "network", 3, 0, Utc::now()).unwrap();
    assert_eq!(status, QueueItemStatus::Failed);

    let report = engine.queue_status(Some("docs"), Utc::now()).unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.pending, 0);
}

#[test]
fn queue_backoff_defers_retry() {
    let engine = engine_with_collection("docs", 4);
    let _id = engine
        .enqueue(&NewQueueItem {
            collection: "docs".into(),
            document_id: "x".into(),
            text: "t".into(),
            priority: 0,
        })
        .unwrap();

    let reserved = engine.reserve(1, Utc::now()).unwrap();
    engine
        .fail_item(reserved[0].id, "slow upstream", 5, 60_000, Utc::now())
        .unwrap();

    // Inside the backoff window: invisible.
    assert!(engine.reserve(1, Utc::now()).unwrap().is_empty());
    // Past the window: visible again.
    let later = Utc::now() + chrono::Duration::milliseconds(61_000);
    assert_eq!(engine.reserve(1, later).unwrap().len(), 1);
}

#[test]
fn queue_sweeper_recovers_stale_reservations() {
    let engine = engine_with_collection("docs", 4);
    engine
        .enqueue(&NewQueueItem {
            collection: "docs".into(),
            document_id: "x".into(),
            text: "t".into(),
            priority: 0,
        })
        .unwrap();
    engine.reserve(1, Utc::now()).unwrap();

    // Not yet stale.
    assert_eq!(engine.sweep_stale(300, Utc::now()).unwrap(), 0);

    // Pretend the visibility timeout has long passed.
    let future = Utc::now() + chrono::Duration::seconds(301);
    assert_eq!(engine.sweep_stale(300, future).unwrap(), 1);
    let report = engine.queue_status(Some("docs"), future).unwrap();
    assert_eq!(report.pending, 1);
    assert_eq!(report.processing, 0);
}

#[test]
fn queue_clear_refuses_processing_by_default() {
    let engine = engine_with_collection("docs", 4);
    for i in 0..3 {
        engine
            .enqueue(&NewQueueItem {
                collection: "docs".into(),
                document_id: format!("d{i}"),
                text: "t".into(),
                priority: 0,
            })
            .unwrap();
    }
    engine.reserve(1, Utc::now()).unwrap();

    let cleared = engine.clear_queue(Some("docs"), false).unwrap();
    assert_eq!(cleared, 2, "processing item survives");
    let report = engine.queue_status(Some("docs"), Utc::now()).unwrap();
    assert_eq!(report.processing, 1);

    assert_eq!(engine.clear_queue(Some("docs"), true).unwrap(), 1);
}

#[test]
fn completed_items_never_regress() {
    let engine = engine_with_collection("docs", 4);
    let id = engine
        .enqueue(&NewQueueItem {
            collection: "docs".into(),
            document_id: "x".into(),
            text: "t".into(),
            priority: 0,
        })
        .unwrap();
    engine.reserve(1, Utc::now()).unwrap();
    engine.complete_item(id, Utc::now()).unwrap();

    // Completed rows are not reservable and cannot be completed again.
    assert!(engine.reserve(1, Utc::now()).unwrap().is_empty());
    assert!(engine.complete_item(id, Utc::now()).is_err());
    let report = engine.queue_status(Some("docs"), Utc::now()).unwrap();
    assert_eq!(report.completed, 1);
}

#[test]
fn cache_roundtrip_and_expiry() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let now = Utc::now();
    let record = CacheRecord {
        key: "k1".into(),
        blob: vec![1, 2, 3, 4],
        compressed: false,
        provider_id: "local-hash".into(),
        model_id: "m".into(),
        dimensions: 1,
        tags: vec!["docs".into()],
        created_at: now,
        expires_at: Some(now + chrono::Duration::seconds(60)),
        last_used_at: now,
        hit_count: 0,
    };
    engine.cache_put(&record).unwrap();

    let hit = engine.cache_get("k1", now).unwrap().unwrap();
    assert_eq!(hit.blob, vec![1, 2, 3, 4]);

    // Hits bump the counter.
    let hit = engine.cache_get("k1", now).unwrap().unwrap();
    assert_eq!(hit.hit_count, 1);

    // Expired entries read as absent and trim away.
    let later = now + chrono::Duration::seconds(120);
    assert!(engine.cache_get("k1", later).unwrap().is_none());
    assert_eq!(engine.cache_trim_expired(later).unwrap(), 1);
}

#[test]
fn cache_invalidation_patterns() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let now = Utc::now();
    for (key, tag) in [("col_a:1", "a"), ("col_a:2", "a"), ("col_b:1", "b")] {
        engine
            .cache_put(&CacheRecord {
                key: key.into(),
                blob: vec![0; 4],
                compressed: false,
                provider_id: "p".into(),
                model_id: "m".into(),
                dimensions: 1,
                tags: vec![tag.into()],
                created_at: now,
                expires_at: None,
                last_used_at: now,
                hit_count: 0,
            })
            .unwrap();
    }

    // Exact.
    assert_eq!(engine.cache_invalidate("col_b:1").unwrap(), 1);
    // Glob.
    assert_eq!(engine.cache_invalidate("col_a:*").unwrap(), 2);
    assert!(engine.cache_get("col_a:1", now).unwrap().is_none());
}

#[test]
fn cache_tag_invalidation() {
    let engine = StorageEngine::open_in_memory().unwrap();
    let now = Utc::now();
    for (key, tag) in [("x1", "docs"), ("x2", "docs"), ("y1", "other")] {
        engine
            .cache_put(&CacheRecord {
                key: key.into(),
                blob: vec![0; 4],
                compressed: false,
                provider_id: "p".into(),
                model_id: "m".into(),
                dimensions: 1,
                tags: vec![tag.into()],
                created_at: now,
                expires_at: None,
                last_used_at: now,
                hit_count: 0,
            })
            .unwrap();
    }
    assert_eq!(engine.cache_invalidate("tag:docs").unwrap(), 2);
    assert!(engine.cache_get("y1", now).unwrap().is_some());
}

#[test]
fn reopen_preserves_schema_and_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quarry.db");
    {
        let engine = StorageEngine::open(&path).unwrap();
        engine
            .create_collection(
                &Collection::new("docs", CollectionEmbeddingConfig::default()).unwrap(),
            )
            .unwrap();
        engine
            .insert_document(&doc("docs", "a", "persisted", "survives reopen"))
            .unwrap();
    }
    {
        let engine = StorageEngine::open(&path).unwrap();
        let found = engine.get_document("docs", "a").unwrap().unwrap();
        assert_eq!(found.title.as_deref(), Some("persisted"));
        let hits = engine.search_fts("docs", "\"survives\"", 10).unwrap();
        assert_eq!(hits.len(), 1);
    }
}

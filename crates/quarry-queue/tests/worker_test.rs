//! Queue worker integration tests over a real in-memory storage engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;

use quarry_core::cancel::CancelFlag;
use quarry_core::config::{
    CacheConfig, CollectionEmbeddingConfig, ProviderConfig, QuarryConfig, QueueConfig,
};
use quarry_core::errors::{ProviderError, QuarryResult};
use quarry_core::models::{
    Collection, Document, EnvironmentCaps, NewQueueItem, ProviderHealth,
    ProviderMetricsSnapshot,
};
use quarry_core::traits::{DocumentStorage, EmbeddingProvider};
use quarry_embeddings::pool::{ProviderKey, ProviderPool};
use quarry_embeddings::{CacheCoordinator, EmbeddingPipeline};
use quarry_queue::QueueWorker;
use quarry_storage::StorageEngine;

struct CountingProvider {
    fail_first: u64,
    calls: AtomicU64,
}

impl EmbeddingProvider for CountingProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }
    fn model_id(&self) -> &str {
        "mock-model"
    }
    fn dimensions(&self) -> usize {
        4
    }
    fn max_batch_size(&self) -> usize {
        64
    }
    fn max_text_length(&self) -> usize {
        10_000
    }
    fn embed(&self, _text: &str) -> QuarryResult<Vec<f32>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_first {
            return Err(ProviderError::Network {
                provider: "mock-provider".into(),
                status: None,
                reason: "connection reset".into(),
            }
            .into());
        }
        Ok(vec![1.0, 0.0, 0.0, 0.0])
    }
    fn embed_batch(&self, texts: &[String]) -> QuarryResult<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
    fn health_check(&self) -> ProviderHealth {
        ProviderHealth::healthy("mock")
    }
    fn metrics(&self) -> ProviderMetricsSnapshot {
        ProviderMetricsSnapshot::default()
    }
}

fn harness(fail_first: u64) -> (Arc<StorageEngine>, QueueWorker) {
    let storage = Arc::new(StorageEngine::open_in_memory().unwrap());

    let embedding = CollectionEmbeddingConfig {
        provider_id: "mock-provider".into(),
        model_id: "mock-model".into(),
        dimensions: 4,
        cache_enabled: false,
        ..CollectionEmbeddingConfig::default()
    };
    storage
        .create_collection(&Collection::new("docs", embedding).unwrap())
        .unwrap();

    let mut config = QuarryConfig::default();
    config.providers.insert(
        "mock-provider".into(),
        ProviderConfig {
            // The pool itself does not retry here; the queue owns retries.
            max_retries: 0,
            retry_base_ms: 1,
            ..ProviderConfig::default()
        },
    );
    let pool = Arc::new(ProviderPool::new(config, EnvironmentCaps::default()));
    pool.register(
        ProviderKey {
            provider_id: "mock-provider".into(),
            model_id: "mock-model".into(),
            dimensions: 4,
        },
        Arc::new(CountingProvider {
            fail_first,
            calls: AtomicU64::new(0),
        }),
    );
    let cache = Arc::new(CacheCoordinator::new(CacheConfig::default(), None, None));
    let pipeline = Arc::new(EmbeddingPipeline::new(cache, pool));

    let worker = QueueWorker::new(
        storage.clone() as Arc<dyn DocumentStorage>,
        pipeline,
        QueueConfig {
            max_attempts: 3,
            backoff_base_ms: 0, // immediate re-reservation in tests
            throttle_ms: 1,
            ..QueueConfig::default()
        },
    );
    (storage, worker)
}

fn enqueue_doc(storage: &StorageEngine, id: &str, text: &str) -> i64 {
    storage
        .insert_document(
            &Document::new("docs", id, None, Some(text.to_string()), serde_json::json!({}))
                .unwrap(),
        )
        .unwrap();
    storage
        .enqueue(&NewQueueItem {
            collection: "docs".into(),
            document_id: id.into(),
            text: text.into(),
            priority: 0,
        })
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn happy_path_completes_and_stores_embedding() {
    let (storage, worker) = harness(0);
    enqueue_doc(&storage, "a", "hello world");

    let report = worker.run_once(&CancelFlag::new()).await.unwrap();
    assert_eq!(report.reserved, 1);
    assert_eq!(report.completed, 1);

    let status = storage.queue_status(Some("docs"), Utc::now()).unwrap();
    assert_eq!(status.completed, 1);
    let record = storage.get_embedding("docs", "a").unwrap().unwrap();
    assert_eq!(record.vector.len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn network_failures_retry_then_succeed() {
    // Fails twice, succeeds on the third provider call.
    let (storage, worker) = harness(2);
    enqueue_doc(&storage, "x", "retry me");

    // Pass 1: failure, rescheduled.
    let report = worker.run_once(&CancelFlag::new()).await.unwrap();
    assert_eq!(report.retried, 1);

    // Pass 2: failure, rescheduled.
    let report = worker.run_once(&CancelFlag::new()).await.unwrap();
    assert_eq!(report.retried, 1);

    // Pass 3: success.
    let report = worker.run_once(&CancelFlag::new()).await.unwrap();
    assert_eq!(report.completed, 1);

    let status = storage.queue_status(Some("docs"), Utc::now()).unwrap();
    assert_eq!(status.completed, 1);
    assert_eq!(status.failed, 0);
    assert!(storage.get_embedding("docs", "x").unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exhausted_attempts_mark_failed_with_message() {
    let (storage, worker) = harness(u64::MAX);
    enqueue_doc(&storage, "x", "never works");

    for _ in 0..3 {
        worker.run_once(&CancelFlag::new()).await.unwrap();
    }

    let status = storage.queue_status(Some("docs"), Utc::now()).unwrap();
    assert_eq!(status.failed, 1);
    assert_eq!(status.pending, 0);
    assert!(storage.get_embedding("docs", "x").unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_until_idle_drains_the_queue() {
    let (storage, worker) = harness(0);
    for i in 0..7 {
        enqueue_doc(&storage, &format!("d{i}"), &format!("document {i}"));
    }

    let total = worker.run_until_idle(&CancelFlag::new()).await.unwrap();
    assert_eq!(total.completed, 7);

    let status = storage.queue_status(Some("docs"), Utc::now()).unwrap();
    assert_eq!(status.pending, 0);
    assert_eq!(status.completed, 7);
    assert!(status.oldest_pending_age_secs.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn items_for_missing_collections_fail_out() {
    let (storage, worker) = harness(0);
    // Enqueue directly for a collection that was never created.
    storage
        .enqueue(&NewQueueItem {
            collection: "ghost-collection".into(),
            document_id: "a".into(),
            text: "t".into(),
            priority: 0,
        })
        .unwrap();

    for _ in 0..3 {
        worker.run_once(&CancelFlag::new()).await.unwrap();
    }
    let status = storage
        .queue_status(Some("ghost-collection"), Utc::now())
        .unwrap();
    assert_eq!(status.failed, 1);
}

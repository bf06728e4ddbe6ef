//! End-to-end tests through the control plane: a real engine on its own
//! runtime thread, driven purely over the handle.

use quarry_control::{Engine, EngineOptions, Method, WireDocument, WireSearchOptions};
use quarry_core::config::{CollectionEmbeddingConfig, QuarryConfig};
use quarry_core::models::SearchStrategy;

fn local_collection(auto_generate: bool) -> CollectionEmbeddingConfig {
    CollectionEmbeddingConfig {
        provider_id: "local-hash".into(),
        model_id: "term-hash-v1".into(),
        dimensions: 256,
        auto_generate,
        ..CollectionEmbeddingConfig::default()
    }
}

fn start_engine(config: QuarryConfig) -> quarry_control::EngineHandle {
    Engine::start(EngineOptions {
        db_path: None,
        config,
        caps: Default::default(),
    })
    .unwrap()
}

fn wire_doc(collection: &str, id: &str, title: &str, content: &str) -> WireDocument {
    WireDocument {
        collection: collection.into(),
        id: quarry_control::DocId::Text(id.into()),
        title: Some(title.into()),
        content: Some(content.into()),
        metadata: serde_json::json!({}),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn keyword_search_without_embeddings_warns() {
    let handle = start_engine(QuarryConfig::default());
    handle
        .call(Method::CreateCollection {
            name: "docs".into(),
            embedding: local_collection(false),
        })
        .await
        .unwrap();
    handle
        .call(Method::InsertDocument {
            document: wire_doc("docs", "a", "greeting", "hello world"),
        })
        .await
        .unwrap();
    handle
        .call(Method::InsertDocument {
            document: wire_doc("docs", "b", "farewell", "goodbye world"),
        })
        .await
        .unwrap();

    let result = handle
        .call(Method::SearchText {
            collection: "docs".into(),
            query: "hello".into(),
            options: WireSearchOptions {
                limit: Some(10),
                ..WireSearchOptions::default()
            },
        })
        .await
        .unwrap();

    assert_eq!(result["strategy"], "keyword");
    let results = result["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"], "a");
    let warnings = result["warnings"].as_array().unwrap();
    assert!(warnings
        .iter()
        .any(|w| w.as_str().unwrap().contains("vector index absent")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ingest_process_search_round_trip() {
    let handle = start_engine(QuarryConfig::default());
    handle
        .call(Method::CreateCollection {
            name: "docs".into(),
            embedding: local_collection(true),
        })
        .await
        .unwrap();

    let inserted = handle
        .call(Method::InsertDocument {
            document: wire_doc("docs", "a", "rust ownership", "ownership and borrowing rules"),
        })
        .await
        .unwrap();
    assert_eq!(inserted["queued"], true, "auto-generate queues embedding work");

    let report = handle.call(Method::ProcessQueue).await.unwrap();
    assert_eq!(report["completed"], 1);

    let status = handle
        .call(Method::QueueStatus {
            collection: Some("docs".into()),
        })
        .await
        .unwrap();
    assert_eq!(status["completed"], 1);
    assert_eq!(status["pending"], 0);

    // Insert→search: the title as query finds the document with a
    // positive keyword-side score.
    let result = handle
        .call(Method::SearchText {
            collection: "docs".into(),
            query: "rust ownership".into(),
            options: WireSearchOptions {
                mode: Some(SearchStrategy::Hybrid),
                ..WireSearchOptions::default()
            },
        })
        .await
        .unwrap();
    let results = result["results"].as_array().unwrap();
    assert_eq!(results[0]["id"], "a");
    assert!(results[0]["fts_score"].as_f64().unwrap_or(0.0) > 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unchanged_content_is_not_requeued() {
    let handle = start_engine(QuarryConfig::default());
    handle
        .call(Method::CreateCollection {
            name: "docs".into(),
            embedding: local_collection(true),
        })
        .await
        .unwrap();
    handle
        .call(Method::InsertDocument {
            document: wire_doc("docs", "a", "t", "stable content"),
        })
        .await
        .unwrap();
    handle.call(Method::ProcessQueue).await.unwrap();

    // Same content again: embedding exists for the same hash, no new work.
    let second = handle
        .call(Method::InsertDocument {
            document: wire_doc("docs", "a", "t", "stable content"),
        })
        .await
        .unwrap();
    assert_eq!(second["queued"], false);

    // Changed content re-queues.
    let third = handle
        .call(Method::InsertDocument {
            document: wire_doc("docs", "a", "t", "different content now"),
        })
        .await
        .unwrap();
    assert_eq!(third["queued"], true);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn embed_query_caches_between_calls() {
    let handle = start_engine(QuarryConfig::default());
    handle
        .call(Method::CreateCollection {
            name: "docs".into(),
            embedding: local_collection(false),
        })
        .await
        .unwrap();

    let first = handle
        .call(Method::EmbedQuery {
            collection: "docs".into(),
            text: "semantic query".into(),
        })
        .await
        .unwrap();
    assert_eq!(first["source"], "provider-fresh");
    assert_eq!(first["vector"].as_array().unwrap().len(), 256);

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let second = handle
        .call(Method::EmbedQuery {
            collection: "docs".into(),
            text: "semantic query".into(),
        })
        .await
        .unwrap();
    let source = second["source"].as_str().unwrap();
    assert!(source.starts_with("cache-"), "second call hit {source}");
    assert_eq!(second["vector"], first["vector"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn embed_batch_keeps_order_with_partial_failure() {
    let handle = start_engine(QuarryConfig::default());
    handle
        .call(Method::CreateCollection {
            name: "docs".into(),
            embedding: local_collection(false),
        })
        .await
        .unwrap();

    let result = handle
        .call(Method::EmbedBatch {
            collection: "docs".into(),
            requests: vec![
                quarry_control::message::WireEmbedRequest {
                    id: quarry_control::DocId::Text("1".into()),
                    text: "a".into(),
                },
                quarry_control::message::WireEmbedRequest {
                    id: quarry_control::DocId::Text("2".into()),
                    text: "".into(),
                },
                quarry_control::message::WireEmbedRequest {
                    id: quarry_control::DocId::Text("3".into()),
                    text: "c".into(),
                },
            ],
            fail_fast: false,
        })
        .await
        .unwrap();

    let entries = result["results"].as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["id"], "1");
    assert_eq!(entries[0]["ok"], true);
    assert_eq!(entries[1]["id"], "2");
    assert_eq!(entries[1]["ok"], false);
    assert_eq!(entries[1]["error"]["code"], "invalid_input");
    assert_eq!(entries[2]["id"], "3");
    assert_eq!(entries[2]["ok"], true);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queue_retries_then_fails_bad_items() {
    let mut config = QuarryConfig::default();
    config.queue.backoff_base_ms = 0;
    config.queue.max_attempts = 3;
    let handle = start_engine(config);
    handle
        .call(Method::CreateCollection {
            name: "docs".into(),
            embedding: local_collection(false),
        })
        .await
        .unwrap();

    // Whitespace-only text can never embed; the item burns its attempts
    // and lands in `failed` with an error message.
    handle
        .call(Method::Enqueue {
            collection: "docs".into(),
            document_id: quarry_control::DocId::Text("x".into()),
            text: "   ".into(),
            priority: 5,
        })
        .await
        .unwrap();

    handle.call(Method::ProcessQueue).await.unwrap();
    let status = handle
        .call(Method::QueueStatus {
            collection: Some("docs".into()),
        })
        .await
        .unwrap();
    assert_eq!(status["failed"], 1);
    assert_eq!(status["pending"], 0);
    assert_eq!(status["processing"], 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn global_search_attaches_collection_info() {
    let handle = start_engine(QuarryConfig::default());
    for name in ["alpha", "beta"] {
        handle
            .call(Method::CreateCollection {
                name: name.into(),
                embedding: local_collection(false),
            })
            .await
            .unwrap();
        handle
            .call(Method::InsertDocument {
                document: wire_doc(name, "matching", "matching", "matching content"),
            })
            .await
            .unwrap();
    }

    let result = handle
        .call(Method::SearchGlobal {
            query: "matching".into(),
            options: WireSearchOptions {
                limit: Some(5),
                ..WireSearchOptions::default()
            },
        })
        .await
        .unwrap();

    let results = result["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["collection"], "alpha", "(collection, id) tie-break");
    assert_eq!(results[1]["collection"], "beta");
    assert!(results
        .iter()
        .all(|r| r["collection_info"]["document_count"] == 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clear_collection_wipes_documents_and_cache() {
    let handle = start_engine(QuarryConfig::default());
    handle
        .call(Method::CreateCollection {
            name: "docs".into(),
            embedding: local_collection(false),
        })
        .await
        .unwrap();
    for i in 0..4 {
        handle
            .call(Method::InsertDocument {
                document: wire_doc("docs", &format!("d{i}"), "t", "clearable"),
            })
            .await
            .unwrap();
    }

    let cleared = handle
        .call(Method::ClearCollection {
            collection: "docs".into(),
        })
        .await
        .unwrap();
    assert_eq!(cleared["deleted"], 4);

    let result = handle
        .call(Method::SearchText {
            collection: "docs".into(),
            query: "clearable".into(),
            options: WireSearchOptions::default(),
        })
        .await
        .unwrap();
    assert!(result["results"].as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn errors_carry_stable_codes() {
    let handle = start_engine(QuarryConfig::default());

    let err = handle
        .call(Method::SearchText {
            collection: "missing".into(),
            query: "q".into(),
            options: WireSearchOptions::default(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, "storage");

    let err = handle
        .call(Method::CreateCollection {
            name: "bad name!".into(),
            embedding: local_collection(false),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, "configuration");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn metrics_and_health_report() {
    let handle = start_engine(QuarryConfig::default());
    handle
        .call(Method::CreateCollection {
            name: "docs".into(),
            embedding: local_collection(false),
        })
        .await
        .unwrap();

    let health = handle.call(Method::Health).await.unwrap();
    assert_eq!(health["healthy"], true);
    assert_eq!(health["collections"], 1);

    let metrics = handle.call(Method::Metrics).await.unwrap();
    assert!(metrics["control"]["total_calls"].as_u64().unwrap() >= 1);
    assert!(metrics["control"]["success_rate"].as_f64().unwrap() > 0.0);
    assert!(metrics.get("cache").is_some());

    let snapshot = handle.metrics();
    assert!(snapshot.total_calls >= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn on_disk_engine_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quarry.db");

    {
        let handle = Engine::start(EngineOptions {
            db_path: Some(path.clone()),
            config: QuarryConfig::default(),
            caps: Default::default(),
        })
        .unwrap();
        handle
            .call(Method::CreateCollection {
                name: "docs".into(),
                embedding: local_collection(false),
            })
            .await
            .unwrap();
        handle
            .call(Method::InsertDocument {
                document: wire_doc("docs", "a", "persisted", "survives restart"),
            })
            .await
            .unwrap();
        handle.close();
    }

    let handle = Engine::start(EngineOptions {
        db_path: Some(path),
        config: QuarryConfig::default(),
        caps: Default::default(),
    })
    .unwrap();
    let result = handle
        .call(Method::SearchText {
            collection: "docs".into(),
            query: "survives".into(),
            options: WireSearchOptions::default(),
        })
        .await
        .unwrap();
    assert_eq!(result["results"].as_array().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn forced_hybrid_mode_runs_both_sides() {
    let handle = start_engine(QuarryConfig::default());
    handle
        .call(Method::CreateCollection {
            name: "docs".into(),
            embedding: local_collection(true),
        })
        .await
        .unwrap();
    handle
        .call(Method::InsertDocument {
            document: wire_doc("docs", "a", "alpha", "alpha content body"),
        })
        .await
        .unwrap();
    handle
        .call(Method::InsertDocument {
            document: wire_doc("docs", "b", "beta", "beta content body"),
        })
        .await
        .unwrap();
    handle.call(Method::ProcessQueue).await.unwrap();

    let result = handle
        .call(Method::SearchText {
            collection: "docs".into(),
            query: "alpha content".into(),
            options: WireSearchOptions {
                mode: Some(SearchStrategy::Hybrid),
                limit: Some(5),
                ..WireSearchOptions::default()
            },
        })
        .await
        .unwrap();

    assert_eq!(result["used_fts"], true);
    assert_eq!(result["used_vector"], true);
    let results = result["results"].as_array().unwrap();
    assert_eq!(results[0]["id"], "a");
    assert!(results[0]["snippet"].as_str().unwrap().contains("[[alpha]]"));
}

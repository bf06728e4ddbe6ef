//! Control-plane wire format: JSON-compatible typed messages. Requests
//! carry `{id, method, params}`, responses `{id, result | error}`; log
//! messages multiplex on the same channel without touching correlation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use quarry_core::config::CollectionEmbeddingConfig;
use quarry_core::models::SearchStrategy;

/// Document ids arrive as strings or integers; both render to the stored
/// string form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocId {
    Text(String),
    Number(i64),
}

impl DocId {
    pub fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireSearchOptions {
    pub mode: Option<SearchStrategy>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub filters: BTreeMap<String, serde_json::Value>,
    pub rerank: Option<bool>,
    pub diversify: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireDocument {
    pub collection: String,
    pub id: DocId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEmbedRequest {
    pub id: DocId,
    pub text: String,
}

/// Every operation the engine exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Method {
    SearchText {
        collection: String,
        query: String,
        #[serde(default)]
        options: WireSearchOptions,
    },
    SearchGlobal {
        query: String,
        #[serde(default)]
        options: WireSearchOptions,
    },
    EmbedQuery {
        collection: String,
        text: String,
    },
    EmbedBatch {
        collection: String,
        requests: Vec<WireEmbedRequest>,
        #[serde(default)]
        fail_fast: bool,
    },
    WarmCache {
        collection: String,
        queries: Vec<String>,
    },
    CreateCollection {
        name: String,
        #[serde(default)]
        embedding: CollectionEmbeddingConfig,
    },
    ListCollections,
    InsertDocument {
        document: WireDocument,
    },
    InsertDocuments {
        documents: Vec<WireDocument>,
    },
    GetDocument {
        collection: String,
        id: DocId,
    },
    DeleteDocument {
        collection: String,
        id: DocId,
    },
    Enqueue {
        collection: String,
        document_id: DocId,
        text: String,
        #[serde(default)]
        priority: i64,
    },
    QueueStatus {
        #[serde(default)]
        collection: Option<String>,
    },
    ProcessQueue,
    CacheStats,
    CacheInvalidate {
        pattern: String,
    },
    /// Collection-scoped wipe: cache invalidation plus transactional
    /// SQL deletes.
    ClearCollection {
        collection: String,
    },
    Metrics,
    Health,
}

impl Method {
    /// Wire-level method name, used in logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SearchText { .. } => "search_text",
            Self::SearchGlobal { .. } => "search_global",
            Self::EmbedQuery { .. } => "embed_query",
            Self::EmbedBatch { .. } => "embed_batch",
            Self::WarmCache { .. } => "warm_cache",
            Self::CreateCollection { .. } => "create_collection",
            Self::ListCollections => "list_collections",
            Self::InsertDocument { .. } => "insert_document",
            Self::InsertDocuments { .. } => "insert_documents",
            Self::GetDocument { .. } => "get_document",
            Self::DeleteDocument { .. } => "delete_document",
            Self::Enqueue { .. } => "enqueue",
            Self::QueueStatus { .. } => "queue_status",
            Self::ProcessQueue => "process_queue",
            Self::CacheStats => "cache_stats",
            Self::CacheInvalidate { .. } => "cache_invalidate",
            Self::ClearCollection { .. } => "clear_collection",
            Self::Metrics => "metrics",
            Self::Health => "health",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    #[serde(flatten)]
    pub method: Method,
}

/// Machine-readable error envelope: stable code plus human message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    pub code: String,
    pub message: String,
}

impl From<&quarry_core::errors::QuarryError> for WireError {
    fn from(err: &quarry_core::errors::QuarryError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl Response {
    pub fn success(id: u64, result: serde_json::Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: u64, error: WireError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Structured log line multiplexed beside responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub level: String,
    pub message: String,
}

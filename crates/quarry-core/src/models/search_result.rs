use serde::{Deserialize, Serialize};

use super::query_analysis::SearchStrategy;

/// One full-text hit: document id plus a higher-is-better BM25 score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FtsHit {
    pub doc_id: String,
    pub score: f64,
}

/// One vector hit: document id plus cosine similarity
/// (1 identical … −1 opposite; higher = closer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnHit {
    pub doc_id: String,
    pub similarity: f64,
}

/// Where an embedding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingSource {
    CacheMemory,
    CachePersistent,
    CacheDatabase,
    ProviderFresh,
}

impl EmbeddingSource {
    pub fn is_cache(&self) -> bool {
        !matches!(self, Self::ProviderFresh)
    }
}

/// Per-collection metadata attached to global search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub provider_id: String,
    pub document_count: usize,
}

/// One fused search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub collection: String,
    pub id: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub metadata: serde_json::Value,
    pub combined_score: f64,
    pub fts_score: Option<f64>,
    pub vector_score: Option<f64>,
    pub fts_rank: Option<usize>,
    pub vector_rank: Option<usize>,
    pub snippet: Option<String>,
    pub collection_info: Option<CollectionInfo>,
}

/// Wall-clock per stage, milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    pub analysis_ms: u64,
    pub planning_ms: u64,
    pub embedding_ms: u64,
    pub execution_ms: u64,
    pub fusion_ms: u64,
    pub total_ms: u64,
}

/// A complete search response: results, degradation warnings, and the
/// strategy that actually ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub strategy: SearchStrategy,
    pub warnings: Vec<String>,
    pub used_fts: bool,
    pub used_vector: bool,
    pub timings: StageTimings,
}

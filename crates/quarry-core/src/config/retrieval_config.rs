use serde::{Deserialize, Serialize};

use super::defaults;

/// Retrieval subsystem configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// RRF smoothing constant.
    pub rrf_k: u32,
    /// Candidate over-fetch multiplier for each retrieval side.
    pub overscan: usize,
    pub default_limit: usize,
    pub snippet_max_chars: usize,
    /// Candidates considered by the optional reranker.
    pub rerank_top_k: usize,
    pub rerank_enabled: bool,
    /// Relevance/novelty trade-off for the MMR diversity pass.
    pub diversity_lambda: f64,
    pub diversity_enabled: bool,
    pub performance_budget_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: defaults::DEFAULT_RRF_K,
            overscan: defaults::DEFAULT_OVERSCAN,
            default_limit: defaults::DEFAULT_SEARCH_LIMIT,
            snippet_max_chars: defaults::DEFAULT_SNIPPET_MAX_CHARS,
            rerank_top_k: defaults::DEFAULT_RERANK_TOP_K,
            rerank_enabled: false,
            diversity_lambda: defaults::DEFAULT_DIVERSITY_LAMBDA,
            diversity_enabled: false,
            performance_budget_ms: defaults::DEFAULT_PERFORMANCE_BUDGET_MS,
        }
    }
}

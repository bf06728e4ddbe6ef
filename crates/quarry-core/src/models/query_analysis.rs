use serde::{Deserialize, Serialize};

/// What the user is trying to do, inferred from surface features only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    #[default]
    Search,
    Question,
    Navigational,
    Transactional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryComplexity {
    #[default]
    Low,
    Medium,
    High,
}

/// Retrieval strategy a plan can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    Keyword,
    Vector,
    Hybrid,
}

impl SearchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Vector => "vector",
            Self::Hybrid => "hybrid",
        }
    }
}

/// Transient feature vector computed from the raw query. Cheap: no
/// embeddings, no SQL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub original: String,
    pub normalized: String,
    pub length: usize,
    pub word_count: usize,
    pub avg_word_length: f64,
    pub has_quotes: bool,
    pub has_boolean_ops: bool,
    pub has_wildcards: bool,
    pub has_numbers: bool,
    pub has_stop_words: bool,
    pub stop_word_ratio: f64,
    pub intent: QueryIntent,
    pub complexity: QueryComplexity,
    pub suggested_strategy: SearchStrategy,
    pub alternative_strategies: Vec<SearchStrategy>,
}

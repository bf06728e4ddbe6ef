use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A dense vector attached to a document. At most one current record per
/// `(collection, document_id)`; the vector length equals the collection's
/// configured dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub document_id: String,
    pub vector: Vec<f32>,
    pub provider_id: String,
    pub model_id: String,
    /// Content hash of the processed text at generation time; a changed
    /// hash is what triggers re-embedding.
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

impl EmbeddingRecord {
    pub fn new(
        document_id: impl Into<String>,
        vector: Vec<f32>,
        provider_id: impl Into<String>,
        model_id: impl Into<String>,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            vector,
            provider_id: provider_id.into(),
            model_id: model_id.into(),
            content_hash: content_hash.into(),
            created_at: Utc::now(),
        }
    }
}

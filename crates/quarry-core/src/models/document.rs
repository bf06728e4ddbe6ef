use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_METADATA_BYTES;
use crate::errors::{QuarryError, QuarryResult};

/// User payload. `(collection, id)` is unique; at least one of title and
/// content is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub collection: String,
    pub title: Option<String>,
    pub content: Option<String>,
    /// JSON object; must round-trip through serde_json and stay under 1 MiB.
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Build a validated document. Integer ids are accepted at the control
    /// plane edge and arrive here already rendered to strings.
    pub fn new(
        collection: &str,
        id: &str,
        title: Option<String>,
        content: Option<String>,
        metadata: serde_json::Value,
    ) -> QuarryResult<Self> {
        let id = id.trim();
        if id.is_empty() {
            return Err(QuarryError::invalid_input("document id is empty"));
        }
        if title.as_deref().map_or(true, str::is_empty)
            && content.as_deref().map_or(true, str::is_empty)
        {
            return Err(QuarryError::invalid_input(
                "document needs at least one of title or content",
            ));
        }
        validate_metadata(&metadata)?;
        Ok(Self {
            id: id.to_string(),
            collection: collection.to_string(),
            title,
            content,
            metadata,
            created_at: Utc::now(),
        })
    }

    /// The text embedded when auto-generation is on.
    pub fn embeddable_text(&self) -> &str {
        self.content
            .as_deref()
            .filter(|c| !c.is_empty())
            .or(self.title.as_deref())
            .unwrap_or("")
    }
}

/// Metadata must be a JSON object (or null) and serialize under the cap.
pub fn validate_metadata(metadata: &serde_json::Value) -> QuarryResult<()> {
    if !(metadata.is_object() || metadata.is_null()) {
        return Err(QuarryError::invalid_input("metadata must be a JSON object"));
    }
    let serialized = serde_json::to_string(metadata)
        .map_err(|e| QuarryError::invalid_input(format!("metadata not serializable: {e}")))?;
    if serialized.len() > MAX_METADATA_BYTES {
        return Err(QuarryError::invalid_input(format!(
            "metadata exceeds {MAX_METADATA_BYTES} bytes serialized"
        )));
    }
    Ok(())
}

/// Outcome of a batch insert. Documents commit first; FTS sync happens
/// afterwards in sub-batches, so FTS failures surface here as warnings
/// rather than rolled-back documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchInsertReport {
    pub inserted: usize,
    pub fts_synced: usize,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requires_title_or_content() {
        let err = Document::new("docs", "a", None, None, json!({})).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
        assert!(Document::new("docs", "a", Some("t".into()), None, json!({})).is_ok());
        assert!(Document::new("docs", "a", None, Some("c".into()), json!({})).is_ok());
    }

    #[test]
    fn rejects_blank_id() {
        let err = Document::new("docs", "   ", Some("t".into()), None, json!({})).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn trims_id() {
        let doc = Document::new("docs", " a1 ", Some("t".into()), None, json!({})).unwrap();
        assert_eq!(doc.id, "a1");
    }

    #[test]
    fn rejects_non_object_metadata() {
        let err =
            Document::new("docs", "a", Some("t".into()), None, json!([1, 2, 3])).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn rejects_oversized_metadata() {
        let big = json!({ "blob": "x".repeat(MAX_METADATA_BYTES) });
        let err = Document::new("docs", "a", Some("t".into()), None, big).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn embeddable_text_prefers_content() {
        let doc = Document::new(
            "docs",
            "a",
            Some("title".into()),
            Some("content".into()),
            json!({}),
        )
        .unwrap();
        assert_eq!(doc.embeddable_text(), "content");
    }
}

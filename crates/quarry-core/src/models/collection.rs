use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CollectionEmbeddingConfig;
use crate::constants::MAX_COLLECTION_NAME_LEN;
use crate::errors::{ConfigError, QuarryResult};

/// Whether embedding generation is configured for a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingStatus {
    #[default]
    Enabled,
    Disabled,
}

/// Live state of a collection's background processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    Idle,
    Running,
    Degraded,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Degraded => "degraded",
        }
    }
}

impl EmbeddingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }
}

/// A named group of documents with a fixed embedding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    pub embedding: CollectionEmbeddingConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u32,
    pub embedding_status: EmbeddingStatus,
    pub processing_status: ProcessingStatus,
}

impl Collection {
    /// Create a collection with a validated name. Provider, model, and
    /// dimensions are fixed from this point on.
    pub fn new(name: &str, embedding: CollectionEmbeddingConfig) -> QuarryResult<Self> {
        Self::validate_name(name)?;
        let now = Utc::now();
        Ok(Self {
            name: name.to_string(),
            embedding,
            created_at: now,
            updated_at: now,
            schema_version: 2,
            embedding_status: EmbeddingStatus::Enabled,
            processing_status: ProcessingStatus::Idle,
        })
    }

    /// Names are ASCII `[A-Za-z0-9_-]`, 1..=50 chars. The validated name
    /// is the only thing ever interpolated into per-collection DDL, which
    /// is what makes that interpolation safe.
    pub fn validate_name(name: &str) -> QuarryResult<()> {
        if name.is_empty() {
            return Err(ConfigError::InvalidCollectionName {
                reason: "name is empty".to_string(),
            }
            .into());
        }
        if name.len() > MAX_COLLECTION_NAME_LEN {
            return Err(ConfigError::InvalidCollectionName {
                reason: format!("name exceeds {MAX_COLLECTION_NAME_LEN} characters"),
            }
            .into());
        }
        if !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(ConfigError::InvalidCollectionName {
                reason: "name may only contain [A-Za-z0-9_-]".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

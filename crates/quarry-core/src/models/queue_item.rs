use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Queue item lifecycle: `pending → processing → completed | failed`.
/// Failed items with attempts left are rescheduled as `pending`; terminal
/// items are retained for observability until trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A background embedding work item (one row in `embedding_queue`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: i64,
    pub collection: String,
    pub document_id: String,
    pub text: String,
    /// Higher priority is reserved sooner; ties break by `enqueued_at`.
    pub priority: i64,
    pub status: QueueItemStatus,
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Enqueue payload; the row id is assigned by storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewQueueItem {
    pub collection: String,
    pub document_id: String,
    pub text: String,
    pub priority: i64,
}

/// Per-state counts plus the oldest pending age.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStatusReport {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub oldest_pending_age_secs: Option<i64>,
}

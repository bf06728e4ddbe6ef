//! The queue worker loop.
//!
//! One pass: sweep stale reservations, reserve a batch (priority desc,
//! oldest first), group it per collection to maximize provider batching,
//! embed through the pipeline, write embeddings through storage, then
//! complete or reschedule each item. Enqueueing is storage's job and
//! never fails because processing later might.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use quarry_core::cancel::CancelFlag;
use quarry_core::config::QueueConfig;
use quarry_core::errors::QuarryResult;
use quarry_core::models::{EmbeddingRecord, ProcessingStatus, QueueItem, QueueItemStatus};
use quarry_core::traits::DocumentStorage;
use quarry_embeddings::{BatchOptions, EmbedRequest, EmbeddingPipeline};

/// Outcome of one worker pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueRunReport {
    pub swept: usize,
    pub reserved: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
}

pub struct QueueWorker {
    storage: Arc<dyn DocumentStorage>,
    pipeline: Arc<EmbeddingPipeline>,
    cfg: QueueConfig,
}

impl QueueWorker {
    pub fn new(
        storage: Arc<dyn DocumentStorage>,
        pipeline: Arc<EmbeddingPipeline>,
        cfg: QueueConfig,
    ) -> Self {
        Self {
            storage,
            pipeline,
            cfg,
        }
    }

    /// One reserve-process-complete pass. Returns without sleeping; the
    /// caller owns throttling between passes.
    pub async fn run_once(&self, cancel: &CancelFlag) -> QuarryResult<QueueRunReport> {
        let mut report = QueueRunReport::default();
        let now = Utc::now();

        report.swept = self
            .storage
            .sweep_stale(self.cfg.visibility_timeout_secs, now)?;
        if report.swept > 0 {
            warn!(swept = report.swept, "returned stale reservations to pending");
        }

        let reserved = self.storage.reserve(self.cfg.batch_size, now)?;
        report.reserved = reserved.len();
        if reserved.is_empty() {
            return Ok(report);
        }
        debug!(reserved = report.reserved, "reserved queue batch");

        for (collection_name, items) in group_by_collection(reserved) {
            self.process_collection(&collection_name, items, cancel, &mut report)
                .await?;
        }

        info!(
            completed = report.completed,
            retried = report.retried,
            failed = report.failed,
            "queue pass finished"
        );
        Ok(report)
    }

    /// Keep running passes until a reservation comes back empty.
    pub async fn run_until_idle(&self, cancel: &CancelFlag) -> QuarryResult<QueueRunReport> {
        let mut total = QueueRunReport::default();
        loop {
            if cancel.is_cancelled() {
                return Ok(total);
            }
            let pass = self.run_once(cancel).await?;
            total.swept += pass.swept;
            total.reserved += pass.reserved;
            total.completed += pass.completed;
            total.retried += pass.retried;
            total.failed += pass.failed;
            if pass.reserved == 0 {
                return Ok(total);
            }
            tokio::time::sleep(std::time::Duration::from_millis(self.cfg.throttle_ms)).await;
        }
    }

    async fn process_collection(
        &self,
        collection_name: &str,
        items: Vec<QueueItem>,
        cancel: &CancelFlag,
        report: &mut QueueRunReport,
    ) -> QuarryResult<()> {
        let now = Utc::now();
        let Some(collection) = self.storage.get_collection(collection_name)? else {
            for item in &items {
                match self.storage.fail_item(
                    item.id,
                    "collection no longer exists",
                    self.cfg.max_attempts,
                    self.cfg.backoff_base_ms,
                    now,
                )? {
                    QueueItemStatus::Pending => report.retried += 1,
                    _ => report.failed += 1,
                }
            }
            return Ok(());
        };

        let _ = self
            .storage
            .set_processing_status(collection_name, ProcessingStatus::Running);

        let requests: Vec<EmbedRequest> = items
            .iter()
            .map(|item| EmbedRequest {
                id: item.id.to_string(),
                text: item.text.clone(),
            })
            .collect();

        let results = self
            .pipeline
            .embed_batch(&collection, requests, BatchOptions::default(), cancel)
            .await?;

        let mut saw_failure = false;
        for (item, result) in items.iter().zip(results) {
            let now = Utc::now();
            match result.outcome {
                Ok(outcome) => {
                    let record = EmbeddingRecord::new(
                        item.document_id.clone(),
                        outcome.vector,
                        outcome.provider_id,
                        outcome.model_id,
                        outcome.content_hash,
                    );
                    match self.storage.store_embedding(collection_name, &record) {
                        Ok(()) => {
                            self.storage.complete_item(item.id, now)?;
                            report.completed += 1;
                        }
                        Err(e) => {
                            saw_failure = true;
                            match self.storage.fail_item(
                                item.id,
                                &format!("embedding write failed: {e}"),
                                self.cfg.max_attempts,
                                self.cfg.backoff_base_ms,
                                now,
                            )? {
                                QueueItemStatus::Pending => report.retried += 1,
                                _ => report.failed += 1,
                            }
                        }
                    }
                }
                Err(failure) => {
                    saw_failure = true;
                    debug!(
                        item = item.id,
                        code = %failure.code,
                        "queue item embedding failed"
                    );
                    match self.storage.fail_item(
                        item.id,
                        &failure.message,
                        self.cfg.max_attempts,
                        self.cfg.backoff_base_ms,
                        now,
                    )? {
                        QueueItemStatus::Pending => report.retried += 1,
                        _ => report.failed += 1,
                    }
                }
            }
        }

        let _ = self.storage.set_processing_status(
            collection_name,
            if saw_failure {
                ProcessingStatus::Degraded
            } else {
                ProcessingStatus::Idle
            },
        );
        Ok(())
    }
}

/// Group reserved items per collection, preserving reservation order both
/// across and within groups.
fn group_by_collection(items: Vec<QueueItem>) -> Vec<(String, Vec<QueueItem>)> {
    let mut groups: Vec<(String, Vec<QueueItem>)> = Vec::new();
    for item in items {
        match groups.iter_mut().find(|(name, _)| *name == item.collection) {
            Some((_, bucket)) => bucket.push(item),
            None => groups.push((item.collection.clone(), vec![item])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(id: i64, collection: &str) -> QueueItem {
        QueueItem {
            id,
            collection: collection.to_string(),
            document_id: format!("doc-{id}"),
            text: "text".to_string(),
            priority: 0,
            status: QueueItemStatus::Processing,
            attempts: 1,
            enqueued_at: Utc::now(),
            started_at: Some(Utc::now()),
            completed_at: None,
            error_message: None,
        }
    }

    #[test]
    fn grouping_preserves_order() {
        let groups = group_by_collection(vec![
            item(1, "a"),
            item(2, "b"),
            item(3, "a"),
            item(4, "b"),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "a");
        assert_eq!(groups[0].1.iter().map(|i| i.id).collect::<Vec<_>>(), [1, 3]);
        assert_eq!(groups[1].1.iter().map(|i| i.id).collect::<Vec<_>>(), [2, 4]);
    }
}

//! Embedding queue table operations. All state transitions run inside the
//! caller's transaction; no in-memory replica is authoritative.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use quarry_core::errors::{storage_error::to_storage_err, QuarryResult, QueueError};
use quarry_core::models::{NewQueueItem, QueueItem, QueueItemStatus, QueueStatusReport};

use crate::codec::{parse_rfc3339, to_rfc3339};

pub fn enqueue(conn: &Connection, item: &NewQueueItem, now: DateTime<Utc>) -> QuarryResult<i64> {
    conn.execute(
        "INSERT INTO embedding_queue
            (collection, document_id, text_content, priority, status, attempts, enqueued_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5)",
        params![
            item.collection,
            item.document_id,
            item.text,
            item.priority,
            to_rfc3339(now),
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(conn.last_insert_rowid())
}

const ITEM_COLUMNS: &str = "id, collection, document_id, text_content, priority, status,
     attempts, enqueued_at, started_at, completed_at, error_message";

fn parse_item(row: &Row<'_>) -> QuarryResult<QueueItem> {
    let status: String = row.get(5).map_err(|e| to_storage_err(e.to_string()))?;
    let enqueued_at: String = row.get(7).map_err(|e| to_storage_err(e.to_string()))?;
    let started_at: Option<String> = row.get(8).map_err(|e| to_storage_err(e.to_string()))?;
    let completed_at: Option<String> = row.get(9).map_err(|e| to_storage_err(e.to_string()))?;
    Ok(QueueItem {
        id: row.get(0).map_err(|e| to_storage_err(e.to_string()))?,
        collection: row.get(1).map_err(|e| to_storage_err(e.to_string()))?,
        document_id: row.get(2).map_err(|e| to_storage_err(e.to_string()))?,
        text: row.get(3).map_err(|e| to_storage_err(e.to_string()))?,
        priority: row.get(4).map_err(|e| to_storage_err(e.to_string()))?,
        status: QueueItemStatus::parse(&status).unwrap_or(QueueItemStatus::Failed),
        attempts: row.get(6).map_err(|e| to_storage_err(e.to_string()))?,
        enqueued_at: parse_rfc3339(&enqueued_at)?,
        started_at: started_at.as_deref().map(parse_rfc3339).transpose()?,
        completed_at: completed_at.as_deref().map(parse_rfc3339).transpose()?,
        error_message: row.get(10).map_err(|e| to_storage_err(e.to_string()))?,
    })
}

/// Reserve up to `batch_size` items: highest priority first, oldest first
/// within a priority, skipping backoff windows. Reserved items flip to
/// `processing` with `started_at` set and `attempts` incremented.
pub fn reserve(
    conn: &Connection,
    batch_size: usize,
    now: DateTime<Utc>,
) -> QuarryResult<Vec<QueueItem>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM embedding_queue
             WHERE status = 'pending' AND (not_before IS NULL OR not_before <= ?1)
             ORDER BY priority DESC, enqueued_at ASC, id ASC
             LIMIT ?2"
        ))
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut rows = stmt
        .query(params![to_rfc3339(now), batch_size as i64])
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut items = Vec::new();
    while let Some(row) = rows.next().map_err(|e| to_storage_err(e.to_string()))? {
        items.push(parse_item(row)?);
    }
    drop(rows);
    drop(stmt);

    for item in &mut items {
        conn.execute(
            "UPDATE embedding_queue
             SET status = 'processing', started_at = ?1, attempts = attempts + 1
             WHERE id = ?2",
            params![to_rfc3339(now), item.id],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
        item.status = QueueItemStatus::Processing;
        item.started_at = Some(now);
        item.attempts += 1;
    }
    Ok(items)
}

pub fn complete(conn: &Connection, id: i64, now: DateTime<Utc>) -> QuarryResult<()> {
    let updated = conn
        .execute(
            "UPDATE embedding_queue
             SET status = 'completed', completed_at = ?1, error_message = NULL
             WHERE id = ?2 AND status = 'processing'",
            params![to_rfc3339(now), id],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    if updated == 0 {
        return Err(QueueError::InvalidTransition {
            id,
            from: "unknown",
            to: "completed",
        }
        .into());
    }
    Ok(())
}

/// Record a processing failure. Items with attempts left go back to
/// `pending` behind an exponential backoff window; exhausted items become
/// `failed`. Returns the resulting status.
pub fn fail(
    conn: &Connection,
    id: i64,
    error: &str,
    max_attempts: u32,
    backoff_base_ms: u64,
    now: DateTime<Utc>,
) -> QuarryResult<QueueItemStatus> {
    let attempts: Option<u32> = conn
        .query_row(
            "SELECT attempts FROM embedding_queue WHERE id = ?1 AND status = 'processing'",
            params![id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;

    let Some(attempts) = attempts else {
        return Err(QueueError::ItemNotFound { id }.into());
    };

    if attempts >= max_attempts {
        conn.execute(
            "UPDATE embedding_queue
             SET status = 'failed', completed_at = ?1, error_message = ?2
             WHERE id = ?3",
            params![to_rfc3339(now), error, id],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
        return Ok(QueueItemStatus::Failed);
    }

    // Backoff doubles per prior attempt: base, 2×base, 4×base, ...
    let delay_ms = backoff_base_ms.saturating_mul(1u64 << (attempts.saturating_sub(1)).min(16));
    let not_before = now + chrono::Duration::milliseconds(delay_ms as i64);
    conn.execute(
        "UPDATE embedding_queue
         SET status = 'pending', not_before = ?1, error_message = ?2, started_at = NULL
         WHERE id = ?3",
        params![to_rfc3339(not_before), error, id],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(QueueItemStatus::Pending)
}

/// Return stale `processing` reservations to `pending`. The attempt was
/// already counted at reservation time, so the crashed run stays on the
/// item's record.
pub fn sweep_stale(
    conn: &Connection,
    visibility_timeout_secs: u64,
    now: DateTime<Utc>,
) -> QuarryResult<usize> {
    let cutoff = now - chrono::Duration::seconds(visibility_timeout_secs as i64);
    let swept = conn
        .execute(
            "UPDATE embedding_queue
             SET status = 'pending', started_at = NULL
             WHERE status = 'processing' AND started_at <= ?1",
            params![to_rfc3339(cutoff)],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(swept)
}

pub fn status(
    conn: &Connection,
    collection: Option<&str>,
    now: DateTime<Utc>,
) -> QuarryResult<QueueStatusReport> {
    let mut report = QueueStatusReport::default();

    let counts: Vec<(String, i64)> = match collection {
        Some(name) => {
            let mut stmt = conn
                .prepare(
                    "SELECT status, COUNT(*) FROM embedding_queue
                     WHERE collection = ?1 GROUP BY status",
                )
                .map_err(|e| to_storage_err(e.to_string()))?;
            let rows = stmt
                .query_map(params![name], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(|e| to_storage_err(e.to_string()))?;
            rows.collect::<Result<_, _>>()
                .map_err(|e| to_storage_err(e.to_string()))?
        }
        None => {
            let mut stmt = conn
                .prepare("SELECT status, COUNT(*) FROM embedding_queue GROUP BY status")
                .map_err(|e| to_storage_err(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(|e| to_storage_err(e.to_string()))?;
            rows.collect::<Result<_, _>>()
                .map_err(|e| to_storage_err(e.to_string()))?
        }
    };
    for (status, count) in counts {
        match status.as_str() {
            "pending" => report.pending = count as usize,
            "processing" => report.processing = count as usize,
            "completed" => report.completed = count as usize,
            "failed" => report.failed = count as usize,
            _ => {}
        }
    }

    let oldest: Option<String> = match collection {
        Some(name) => conn
            .query_row(
                "SELECT MIN(enqueued_at) FROM embedding_queue
                 WHERE status = 'pending' AND collection = ?1",
                params![name],
                |row| row.get(0),
            )
            .map_err(|e| to_storage_err(e.to_string()))?,
        None => conn
            .query_row(
                "SELECT MIN(enqueued_at) FROM embedding_queue WHERE status = 'pending'",
                [],
                |row| row.get(0),
            )
            .map_err(|e| to_storage_err(e.to_string()))?,
    };
    if let Some(ts) = oldest {
        let enqueued = parse_rfc3339(&ts)?;
        report.oldest_pending_age_secs = Some((now - enqueued).num_seconds().max(0));
    }
    Ok(report)
}

/// Remove items. Refuses to touch `processing` reservations unless forced.
pub fn clear(
    conn: &Connection,
    collection: Option<&str>,
    force: bool,
) -> QuarryResult<usize> {
    let status_filter = if force {
        "1 = 1"
    } else {
        "status != 'processing'"
    };
    let removed = match collection {
        Some(name) => conn
            .execute(
                &format!("DELETE FROM embedding_queue WHERE {status_filter} AND collection = ?1"),
                params![name],
            )
            .map_err(|e| to_storage_err(e.to_string()))?,
        None => conn
            .execute(
                &format!("DELETE FROM embedding_queue WHERE {status_filter}"),
                [],
            )
            .map_err(|e| to_storage_err(e.to_string()))?,
    };
    Ok(removed)
}

//! Per-collection vector table queries: savepoint-wrapped upserts and a
//! brute-force cosine KNN scan.

use rusqlite::{params, Connection, OptionalExtension};

use quarry_core::errors::{storage_error::to_storage_err, QuarryResult};
use quarry_core::models::{EmbeddingRecord, KnnHit};

use super::vec_table;
use crate::codec::{bytes_to_f32_vec, f32_vec_to_bytes, parse_rfc3339, to_rfc3339};

/// Upsert a document's embedding. Wrapped in a SAVEPOINT so the delete +
/// insert pair is all-or-nothing.
pub fn store_embedding(
    conn: &Connection,
    collection: &str,
    dimensions: usize,
    record: &EmbeddingRecord,
) -> QuarryResult<()> {
    conn.execute_batch("SAVEPOINT store_emb")
        .map_err(|e| to_storage_err(format!("store_embedding savepoint: {e}")))?;

    match store_embedding_inner(conn, collection, dimensions, record) {
        Ok(()) => {
            conn.execute_batch("RELEASE store_emb")
                .map_err(|e| to_storage_err(format!("store_embedding release: {e}")))?;
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK TO store_emb");
            let _ = conn.execute_batch("RELEASE store_emb");
            Err(e)
        }
    }
}

fn store_embedding_inner(
    conn: &Connection,
    collection: &str,
    dimensions: usize,
    record: &EmbeddingRecord,
) -> QuarryResult<()> {
    let vec = vec_table(collection, dimensions);
    let blob = f32_vec_to_bytes(&record.vector);
    conn.execute(
        &format!(
            "INSERT INTO {vec} (doc_id, embedding, provider, model, content_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(doc_id) DO UPDATE SET
                embedding = excluded.embedding,
                provider = excluded.provider,
                model = excluded.model,
                content_hash = excluded.content_hash,
                created_at = excluded.created_at"
        ),
        params![
            record.document_id,
            blob,
            record.provider_id,
            record.model_id,
            record.content_hash,
            to_rfc3339(record.created_at),
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

pub fn get_embedding(
    conn: &Connection,
    collection: &str,
    dimensions: usize,
    doc_id: &str,
) -> QuarryResult<Option<EmbeddingRecord>> {
    let vec = vec_table(collection, dimensions);
    let row = conn
        .query_row(
            &format!(
                "SELECT doc_id, embedding, provider, model, content_hash, created_at
                 FROM {vec} WHERE doc_id = ?1"
            ),
            params![doc_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;

    match row {
        Some((document_id, blob, provider_id, model_id, content_hash, created_at)) => {
            Ok(Some(EmbeddingRecord {
                document_id,
                vector: bytes_to_f32_vec(&blob),
                provider_id,
                model_id,
                content_hash,
                created_at: parse_rfc3339(&created_at)?,
            }))
        }
        None => Ok(None),
    }
}

pub fn delete_embedding(
    conn: &Connection,
    collection: &str,
    dimensions: usize,
    doc_id: &str,
) -> QuarryResult<()> {
    let vec = vec_table(collection, dimensions);
    conn.execute(&format!("DELETE FROM {vec} WHERE doc_id = ?1"), params![doc_id])
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Whether the collection has a usable vector index: the table exists and
/// holds at least one embedding.
pub fn has_vector_table(
    conn: &Connection,
    collection: &str,
    dimensions: usize,
) -> QuarryResult<bool> {
    let vec = vec_table(collection, dimensions);
    let exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![vec],
            |row| row.get(0),
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    if !exists {
        return Ok(false);
    }
    let populated: bool = conn
        .query_row(&format!("SELECT EXISTS(SELECT 1 FROM {vec})"), [], |row| {
            row.get(0)
        })
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(populated)
}

/// Brute-force cosine KNN over the collection's stored embeddings.
/// Cosine **similarity**: 1 identical … −1 opposite, higher = closer.
/// Results are sorted descending and truncated to `k`.
pub fn search_knn(
    conn: &Connection,
    collection: &str,
    dimensions: usize,
    query: &[f32],
    k: usize,
) -> QuarryResult<Vec<KnnHit>> {
    if k == 0 || query.is_empty() {
        return Ok(Vec::new());
    }
    // Zero-norm queries match nothing.
    let query_norm_sq: f64 = query.iter().map(|x| f64::from(*x).powi(2)).sum();
    if query_norm_sq == 0.0 {
        return Ok(Vec::new());
    }

    let vec = vec_table(collection, dimensions);
    let mut stmt = conn
        .prepare(&format!("SELECT doc_id, embedding FROM {vec}"))
        .map_err(|e| to_storage_err(e.to_string()))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut scored: Vec<KnnHit> = Vec::new();
    for row in rows {
        let (doc_id, blob) = row.map_err(|e| to_storage_err(e.to_string()))?;
        // Dimension mismatches are skipped without a full decode.
        if blob.len() != query.len() * 4 {
            continue;
        }
        let stored = bytes_to_f32_vec(&blob);
        let similarity = cosine_similarity(query, &stored);
        scored.push(KnnHit { doc_id, similarity });
    }

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
    scored.truncate(k);
    Ok(scored)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_extremes() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
    }

    #[test]
    fn zero_vector_scores_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}

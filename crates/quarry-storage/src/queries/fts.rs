//! FTS5 queries and manual external-content sync.
//!
//! The FTS tables mirror the document tables but are synced by hand:
//! document writes commit first, FTS rows follow. Deleting requires the
//! old column values (external-content tables index nothing themselves).

use rusqlite::{params, Connection};

use quarry_core::errors::{storage_error::to_storage_err, QuarryResult};
use quarry_core::models::FtsHit;

use super::{docs_table, fts_table};

/// Insert the FTS row for a document rowid.
pub fn insert_fts_row(
    conn: &Connection,
    collection: &str,
    rowid: i64,
    title: &str,
    content: &str,
    metadata: &str,
) -> QuarryResult<()> {
    let fts = fts_table(collection);
    conn.execute(
        &format!("INSERT INTO {fts} (rowid, title, content, metadata) VALUES (?1, ?2, ?3, ?4)"),
        params![rowid, title, content, metadata],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Remove the FTS row for a document that is about to be replaced or
/// deleted. Requires the currently indexed values.
pub fn delete_fts_row(
    conn: &Connection,
    collection: &str,
    rowid: i64,
    title: &str,
    content: &str,
    metadata: &str,
) -> QuarryResult<()> {
    let fts = fts_table(collection);
    conn.execute(
        &format!(
            "INSERT INTO {fts} ({fts}, rowid, title, content, metadata)
             VALUES ('delete', ?1, ?2, ?3, ?4)"
        ),
        params![rowid, title, content, metadata],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// Drop the whole FTS index for a collection.
pub fn delete_all_fts(conn: &Connection, collection: &str) -> QuarryResult<()> {
    let fts = fts_table(collection);
    conn.execute(
        &format!("INSERT INTO {fts} ({fts}) VALUES ('delete-all')"),
        [],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

/// BM25-ranked full-text search. Returns hits best-first with a
/// higher-is-better score (SQLite's bm25() is smaller-is-better, so it is
/// negated here).
pub fn search_fts(
    conn: &Connection,
    collection: &str,
    match_expr: &str,
    limit: usize,
) -> QuarryResult<Vec<FtsHit>> {
    let fts = fts_table(collection);
    let docs = docs_table(collection);
    let mut stmt = conn
        .prepare(&format!(
            "SELECT d.id, -bm25({fts}) AS score
             FROM {fts}
             JOIN {docs} d ON d.rowid = {fts}.rowid
             WHERE {fts} MATCH ?1
             ORDER BY rank
             LIMIT ?2"
        ))
        .map_err(|e| to_storage_err(e.to_string()))?;

    let rows = stmt
        .query_map(params![match_expr, limit as i64], |row| {
            Ok(FtsHit {
                doc_id: row.get(0)?,
                score: row.get(1)?,
            })
        })
        .map_err(|e| to_storage_err(e.to_string()))?;

    let mut hits = Vec::new();
    for row in rows {
        hits.push(row.map_err(|e| to_storage_err(e.to_string()))?);
    }
    Ok(hits)
}

//! Document CRUD over the per-collection tables.

use rusqlite::{params, Connection, OptionalExtension};

use quarry_core::errors::{storage_error::to_storage_err, QuarryResult};
use quarry_core::models::Document;

use super::{docs_table, fts};
use crate::codec::{parse_rfc3339, to_rfc3339};

/// Currently indexed values of a document row, needed for FTS deletes.
pub struct IndexedRow {
    pub rowid: i64,
    pub title: String,
    pub content: String,
    pub metadata: String,
}

pub fn indexed_row(
    conn: &Connection,
    collection: &str,
    id: &str,
) -> QuarryResult<Option<IndexedRow>> {
    let docs = docs_table(collection);
    conn.query_row(
        &format!(
            "SELECT rowid, COALESCE(title, ''), COALESCE(content, ''), metadata
             FROM {docs} WHERE id = ?1"
        ),
        params![id],
        |row| {
            Ok(IndexedRow {
                rowid: row.get(0)?,
                title: row.get(1)?,
                content: row.get(2)?,
                metadata: row.get(3)?,
            })
        },
    )
    .optional()
    .map_err(|e| to_storage_err(e.to_string()).into())
}

/// Write the document row (replacing any previous version) and return the
/// new rowid. The caller decides when the FTS row is synced.
pub fn upsert_document_row(conn: &Connection, doc: &Document) -> QuarryResult<i64> {
    let docs = docs_table(&doc.collection);

    // Clear the stale FTS entry before the row it references is replaced.
    if let Some(old) = indexed_row(conn, &doc.collection, &doc.id)? {
        fts::delete_fts_row(
            conn,
            &doc.collection,
            old.rowid,
            &old.title,
            &old.content,
            &old.metadata,
        )?;
        conn.execute(&format!("DELETE FROM {docs} WHERE id = ?1"), params![doc.id])
            .map_err(|e| to_storage_err(e.to_string()))?;
    }

    let metadata = serde_json::to_string(&doc.metadata)
        .map_err(|e| to_storage_err(format!("metadata serialize: {e}")))?;
    conn.execute(
        &format!(
            "INSERT INTO {docs} (id, collection, title, content, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        ),
        params![
            doc.id,
            doc.collection,
            doc.title,
            doc.content,
            metadata,
            to_rfc3339(doc.created_at),
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    Ok(conn.last_insert_rowid())
}

pub fn get_document(
    conn: &Connection,
    collection: &str,
    id: &str,
) -> QuarryResult<Option<Document>> {
    let docs = docs_table(collection);
    let row = conn
        .query_row(
            &format!(
                "SELECT id, collection, title, content, metadata, created_at
                 FROM {docs} WHERE id = ?1"
            ),
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;

    match row {
        Some((id, collection, title, content, metadata, created_at)) => {
            let metadata = serde_json::from_str(&metadata)
                .map_err(|e| to_storage_err(format!("metadata parse: {e}")))?;
            Ok(Some(Document {
                id,
                collection,
                title,
                content,
                metadata,
                created_at: parse_rfc3339(&created_at)?,
            }))
        }
        None => Ok(None),
    }
}

/// Delete the document row and its FTS entry. Returns false when the id
/// was unknown. Vector and queue cleanup is layered on by the engine.
pub fn delete_document_row(conn: &Connection, collection: &str, id: &str) -> QuarryResult<bool> {
    let Some(old) = indexed_row(conn, collection, id)? else {
        return Ok(false);
    };
    fts::delete_fts_row(conn, collection, old.rowid, &old.title, &old.content, &old.metadata)?;
    let docs = docs_table(collection);
    conn.execute(&format!("DELETE FROM {docs} WHERE id = ?1"), params![id])
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(true)
}

pub fn count_documents(conn: &Connection, collection: &str) -> QuarryResult<usize> {
    let docs = docs_table(collection);
    let count: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {docs}"), [], |row| row.get(0))
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(count as usize)
}

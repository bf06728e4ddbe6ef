//! Collection registry CRUD plus per-collection table DDL.

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use quarry_core::config::CollectionEmbeddingConfig;
use quarry_core::errors::{storage_error::to_storage_err, QuarryResult, StorageError};
use quarry_core::models::{Collection, EmbeddingStatus, ProcessingStatus};

use super::{docs_table, fts_table, vec_table};
use crate::codec::{parse_rfc3339, to_rfc3339};

/// Insert the registry row and create the collection's document, FTS, and
/// vector tables. Runs inside the caller's transaction.
pub fn create_collection(conn: &Connection, collection: &Collection) -> QuarryResult<()> {
    let exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM collections WHERE name = ?1)",
            params![collection.name],
            |row| row.get(0),
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    if exists {
        return Err(StorageError::CollectionExists {
            name: collection.name.clone(),
        }
        .into());
    }

    let config_json = serde_json::to_string(&collection.embedding)
        .map_err(|e| to_storage_err(format!("config serialize: {e}")))?;

    conn.execute(
        "INSERT INTO collections
            (name, created_at, updated_at, schema_version, config,
             embedding_provider, embedding_model, embedding_dimensions,
             embedding_status, processing_status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            collection.name,
            to_rfc3339(collection.created_at),
            to_rfc3339(collection.updated_at),
            collection.schema_version,
            config_json,
            collection.embedding.provider_id,
            collection.embedding.model_id,
            collection.embedding.dimensions as i64,
            collection.embedding_status.as_str(),
            collection.processing_status.as_str(),
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    let docs = docs_table(&collection.name);
    let fts = fts_table(&collection.name);
    let vec = vec_table(&collection.name, collection.embedding.dimensions);

    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {docs} (
            id TEXT PRIMARY KEY,
            collection TEXT NOT NULL,
            title TEXT,
            content TEXT,
            metadata TEXT NOT NULL DEFAULT '{{}}',
            created_at TEXT NOT NULL
         );
         CREATE VIRTUAL TABLE IF NOT EXISTS {fts} USING fts5(
            title, content, metadata, content='{docs}'
         );
         CREATE TABLE IF NOT EXISTS {vec} (
            doc_id TEXT PRIMARY KEY,
            embedding BLOB NOT NULL,
            provider TEXT NOT NULL,
            model TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
         );"
    ))
    .map_err(|e| to_storage_err(e.to_string()))?;

    Ok(())
}

const COLLECTION_COLUMNS: &str = "name, created_at, updated_at, schema_version, config,
     embedding_status, processing_status";

fn parse_collection_row(row: &Row<'_>) -> QuarryResult<Collection> {
    let name: String = row.get(0).map_err(|e| to_storage_err(e.to_string()))?;
    let created_at: String = row.get(1).map_err(|e| to_storage_err(e.to_string()))?;
    let updated_at: String = row.get(2).map_err(|e| to_storage_err(e.to_string()))?;
    let schema_version: u32 = row.get(3).map_err(|e| to_storage_err(e.to_string()))?;
    let config_json: String = row.get(4).map_err(|e| to_storage_err(e.to_string()))?;
    let embedding_status: String = row.get(5).map_err(|e| to_storage_err(e.to_string()))?;
    let processing_status: String = row.get(6).map_err(|e| to_storage_err(e.to_string()))?;

    let embedding: CollectionEmbeddingConfig = serde_json::from_str(&config_json)
        .map_err(|e| to_storage_err(format!("config parse: {e}")))?;

    Ok(Collection {
        name,
        embedding,
        created_at: parse_rfc3339(&created_at)?,
        updated_at: parse_rfc3339(&updated_at)?,
        schema_version,
        embedding_status: match embedding_status.as_str() {
            "disabled" => EmbeddingStatus::Disabled,
            _ => EmbeddingStatus::Enabled,
        },
        processing_status: match processing_status.as_str() {
            "running" => ProcessingStatus::Running,
            "degraded" => ProcessingStatus::Degraded,
            _ => ProcessingStatus::Idle,
        },
    })
}

pub fn get_collection(conn: &Connection, name: &str) -> QuarryResult<Option<Collection>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections WHERE name = ?1"
        ))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let mut rows = stmt
        .query(params![name])
        .map_err(|e| to_storage_err(e.to_string()))?;
    match rows.next().map_err(|e| to_storage_err(e.to_string()))? {
        Some(row) => Ok(Some(parse_collection_row(row)?)),
        None => Ok(None),
    }
}

pub fn list_collections(conn: &Connection) -> QuarryResult<Vec<Collection>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections ORDER BY name"
        ))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let mut rows = stmt.query([]).map_err(|e| to_storage_err(e.to_string()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(|e| to_storage_err(e.to_string()))? {
        out.push(parse_collection_row(row)?);
    }
    Ok(out)
}

pub fn set_processing_status(
    conn: &Connection,
    name: &str,
    status: ProcessingStatus,
) -> QuarryResult<()> {
    let updated = conn
        .execute(
            "UPDATE collections SET processing_status = ?1, updated_at = ?2 WHERE name = ?3",
            params![status.as_str(), to_rfc3339(Utc::now()), name],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    if updated == 0 {
        return Err(StorageError::CollectionNotFound {
            name: name.to_string(),
        }
        .into());
    }
    Ok(())
}

//! Postgres-backed document store.
//!
//! Reads the `documents` and `document_chunks` tables written by the
//! upstream extraction/embedding pipeline. Centroids and chunk embeddings
//! are stored as `float4[]` columns. Queries are runtime-bound so the crate
//! builds without a live database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use super::{DocumentStore, StoreError, StoreResult};
use crate::config::StorageConfig;
use crate::types::{ChunkRecord, DocumentId, DocumentMeta};

/// [`DocumentStore`] backed by a Postgres pool.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect a small pool to the configured database.
    pub async fn connect(config: &StorageConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool (shared with the rest of the application).
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn document_meta(&self, id: DocumentId) -> StoreResult<Option<DocumentMeta>> {
        let row = sqlx::query(
            "SELECT id, title, created_at, centroid, chunk_count \
             FROM documents WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let chunk_count: i32 = row.try_get("chunk_count")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let centroid: Option<Vec<f32>> = row.try_get("centroid")?;
        Ok(Some(DocumentMeta {
            id,
            title: row.try_get("title")?,
            created_at,
            centroid,
            chunk_count: u32::try_from(chunk_count).map_err(|_| StoreError::CorruptRow {
                document: id,
                reason: format!("negative chunk_count {chunk_count}"),
            })?,
        }))
    }

    async fn document_chunks(&self, id: DocumentId) -> StoreResult<Vec<ChunkRecord>> {
        let rows = sqlx::query(
            "SELECT document_id, chunk_index, content, char_count, embedding \
             FROM document_chunks WHERE document_id = $1 ORDER BY chunk_index",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let mut chunks = Vec::with_capacity(rows.len());
        for row in rows {
            let document_id: Uuid = row.try_get("document_id")?;
            let chunk_index: i32 = row.try_get("chunk_index")?;
            let char_count: i32 = row.try_get("char_count")?;
            chunks.push(ChunkRecord {
                document_id: DocumentId::new(document_id),
                index: u32::try_from(chunk_index).map_err(|_| StoreError::CorruptRow {
                    document: id,
                    reason: format!("negative chunk_index {chunk_index}"),
                })?,
                text: row.try_get("content")?,
                char_count: u32::try_from(char_count).unwrap_or(0),
                embedding: row.try_get("embedding")?,
            });
        }
        Ok(chunks)
    }
}

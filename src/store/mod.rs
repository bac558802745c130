//! Relational store seam: document metadata and chunk rows.
//!
//! The pipeline only needs two keyed reads: a document's metadata (centroid,
//! chunk count, title, creation time) and its chunk rows ordered by chunk
//! index. Schema design and transaction semantics live upstream.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ChunkRecord, DocumentId, DocumentMeta};

/// Errors from store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row for document {document}: {reason}")]
    CorruptRow {
        document: DocumentId,
        reason: String,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed access to persisted document metadata and chunks.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document's metadata, or `None` if the id is unknown.
    async fn document_meta(&self, id: DocumentId) -> StoreResult<Option<DocumentMeta>>;

    /// Fetch a document's chunks ordered by chunk index. Unknown ids yield
    /// an empty vec; callers distinguish that via [`Self::document_meta`].
    async fn document_chunks(&self, id: DocumentId) -> StoreResult<Vec<ChunkRecord>>;
}

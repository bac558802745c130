//! Vector index seam: the ANN service the pipeline queries and the cleanup
//! worker deletes from.
//!
//! The index is a black box exposing ranked nearest-neighbor search over a
//! structured filter, plus point deletion. Production uses the qdrant
//! backend; tests and local mode use the exact-scan in-memory backend.

pub mod filter;
pub mod memory;
pub mod qdrant;

pub use filter::{DOCUMENT_ID_FIELD, Filter, FilterValue, exclude_document};
pub use memory::MemoryIndex;
pub use qdrant::QdrantIndex;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from index operations.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("index backend error: {0}")]
    Backend(String),
}

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// A nearest-neighbor query against the index.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Query embedding.
    pub vector: Vec<f32>,
    /// Maximum points to return.
    pub limit: usize,
    /// Structured predicate; `None` means unfiltered.
    pub filter: Option<Filter>,
    /// Whether to return point payloads.
    pub with_payload: bool,
}

/// One ranked hit from a search.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// Point id (one point per chunk).
    pub id: String,
    /// Similarity score under the collection's distance metric.
    pub score: f32,
    /// Point payload; empty when the request did not ask for payloads.
    pub payload: BTreeMap<String, Value>,
}

/// Approximate-nearest-neighbor index over chunk embeddings.
///
/// A filter that [`Filter::matches_nothing`] must yield zero results
/// deterministically; backends short-circuit it without a server round trip.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Ranked nearest-neighbor search.
    async fn search(&self, request: SearchRequest) -> IndexResult<Vec<ScoredPoint>>;

    /// Delete specific points by id.
    async fn delete_points(&self, ids: &[String]) -> IndexResult<()>;

    /// Delete every point matching the filter. Used by cleanup when no
    /// point-id hint was recorded at enqueue time.
    async fn delete_by_filter(&self, filter: &Filter) -> IndexResult<()>;
}

//! Exact-scan in-memory vector index.
//!
//! Scores every stored point against the query with cosine similarity.
//! Used by tests and small local corpora; filter semantics mirror the
//! qdrant condition mapping exactly so the backends are interchangeable.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

use super::filter::{DOCUMENT_ID_FIELD, Filter};
use super::{IndexResult, ScoredPoint, SearchRequest, VectorIndex};
use crate::scoring::cosine_similarity;
use crate::types::ChunkRecord;

/// A stored point: one chunk embedding plus its payload.
#[derive(Debug, Clone)]
pub struct MemoryPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: BTreeMap<String, Value>,
}

/// In-memory [`VectorIndex`] backend.
#[derive(Default)]
pub struct MemoryIndex {
    points: RwLock<Vec<MemoryPoint>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a point.
    pub fn add_point(&self, point: MemoryPoint) {
        let mut points = self.points.write();
        points.retain(|p| p.id != point.id);
        points.push(point);
    }

    /// Index a chunk under the given point id with the standard payload
    /// layout (`document_id`, `chunk_index`).
    pub fn add_chunk(&self, point_id: impl Into<String>, chunk: &ChunkRecord) {
        let mut payload = BTreeMap::new();
        payload.insert(
            DOCUMENT_ID_FIELD.to_string(),
            Value::String(chunk.document_id.to_string()),
        );
        payload.insert("chunk_index".to_string(), Value::from(chunk.index));
        self.add_point(MemoryPoint {
            id: point_id.into(),
            vector: chunk.embedding.clone(),
            payload,
        });
    }

    /// Number of stored points.
    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.read().is_empty()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn search(&self, request: SearchRequest) -> IndexResult<Vec<ScoredPoint>> {
        if request
            .filter
            .as_ref()
            .is_some_and(Filter::matches_nothing)
        {
            return Ok(Vec::new());
        }

        let points = self.points.read();
        let mut hits: Vec<ScoredPoint> = points
            .iter()
            .filter(|p| {
                request
                    .filter
                    .as_ref()
                    .is_none_or(|f| f.matches(&p.payload))
            })
            .map(|p| ScoredPoint {
                id: p.id.clone(),
                score: cosine_similarity(&request.vector, &p.vector),
                payload: if request.with_payload {
                    p.payload.clone()
                } else {
                    BTreeMap::new()
                },
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(request.limit);
        Ok(hits)
    }

    async fn delete_points(&self, ids: &[String]) -> IndexResult<()> {
        let mut points = self.points.write();
        points.retain(|p| !ids.contains(&p.id));
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &Filter) -> IndexResult<()> {
        if filter.matches_nothing() {
            return Ok(());
        }
        let mut points = self.points.write();
        points.retain(|p| !filter.matches(&p.payload));
        Ok(())
    }
}

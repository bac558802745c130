//! Stage 0: centroid candidate retrieval.
//!
//! Queries the ANN index with the source document's centroid to produce a
//! broad, high-recall candidate set. Cheap and coarse: one index query for
//! the whole corpus, refined by the later stages.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::{PipelineError, document_id_from_point};
use crate::index::{Filter, SearchRequest, VectorIndex, exclude_document};
use crate::store::DocumentStore;
use crate::types::{Candidate, DocumentId};

/// Caller knobs for candidate retrieval.
#[derive(Debug, Clone, Default)]
pub struct RetrieveOptions {
    /// Maximum candidates returned.
    pub top_k: usize,
    /// Caller-supplied metadata constraints, e.g. an ownership scope.
    pub filters: Option<Filter>,
    /// Query vector override; takes precedence over the persisted centroid
    /// (testing and backfill scenarios).
    pub override_vector: Option<Vec<f32>>,
}

/// Candidate set plus the stage's wall-clock time.
#[derive(Debug, Clone)]
pub struct RetrievedCandidates {
    pub candidates: Vec<Candidate>,
    pub elapsed: Duration,
}

/// Retrieve up to `top_k` candidate documents for `source_id`.
///
/// A document without a centroid or without chunks is a configuration
/// error, not an empty result: callers must be able to distinguish "not
/// enough data to search" from "no matches found".
pub async fn retrieve(
    store: &dyn DocumentStore,
    index: &dyn VectorIndex,
    source_id: DocumentId,
    options: &RetrieveOptions,
) -> Result<RetrievedCandidates, PipelineError> {
    let started = Instant::now();

    let meta = store
        .document_meta(source_id)
        .await?
        .ok_or(PipelineError::UnknownDocument(source_id))?;
    if meta.chunk_count == 0 {
        return Err(PipelineError::MissingChunks(source_id));
    }
    let centroid = meta
        .centroid
        .ok_or(PipelineError::MissingEmbeddings(source_id))?;
    let query_vector = options.override_vector.clone().unwrap_or(centroid);

    let filter = exclude_document(options.filters.clone(), source_id);
    if filter.matches_nothing() {
        // The caller's id scope emptied out after self-exclusion. That is a
        // deterministic zero, never an unfiltered query.
        tracing::debug!(
            target: "pipeline",
            source = %source_id,
            "candidate retrieval filter matches nothing"
        );
        return Ok(RetrievedCandidates {
            candidates: Vec::new(),
            elapsed: started.elapsed(),
        });
    }

    // Overfetch 2x: the index holds one point per chunk, so one document can
    // occupy several of the top slots before deduplication.
    let hits = index
        .search(SearchRequest {
            vector: query_vector.clone(),
            limit: options.top_k * 2,
            filter: Some(filter),
            with_payload: true,
        })
        .await?;

    let mut best_by_document: HashMap<DocumentId, f32> = HashMap::new();
    for point in &hits {
        let document_id = document_id_from_point(point)?;
        best_by_document
            .entry(document_id)
            .and_modify(|score| *score = score.max(point.score))
            .or_insert(point.score);
    }

    let mut candidates: Vec<Candidate> = best_by_document
        .into_iter()
        .map(|(document_id, score)| Candidate { document_id, score })
        .collect();
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    candidates.truncate(options.top_k);

    if candidates.is_empty() && options.filters.is_some() {
        diagnose_empty_scoped_result(index, source_id, &query_vector, options.top_k).await;
    }

    Ok(RetrievedCandidates {
        candidates,
        elapsed: started.elapsed(),
    })
}

/// Distinguish "legitimately no matches" from "the caller's scoping filter
/// is wrong" by re-running the query without the caller's constraints.
///
/// Purely diagnostic: results are logged and discarded, and a failure here
/// must never fail the primary call.
async fn diagnose_empty_scoped_result(
    index: &dyn VectorIndex,
    source_id: DocumentId,
    query_vector: &[f32],
    top_k: usize,
) {
    let unscoped = index
        .search(SearchRequest {
            vector: query_vector.to_vec(),
            limit: top_k * 2,
            filter: Some(exclude_document(None, source_id)),
            with_payload: false,
        })
        .await;
    match unscoped {
        Ok(hits) if hits.is_empty() => {
            tracing::warn!(
                target: "pipeline",
                source = %source_id,
                "scoped retrieval empty; unscoped query also empty (corpus has no neighbors)"
            );
        }
        Ok(hits) => {
            tracing::warn!(
                target: "pipeline",
                source = %source_id,
                unscoped_hits = hits.len(),
                "scoped retrieval empty but unscoped query has hits; caller filter may be wrong"
            );
        }
        Err(e) => {
            tracing::warn!(
                target: "pipeline",
                source = %source_id,
                error = %e,
                "diagnostic fallback query failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::store::MemoryStore;
    use crate::test_support::{document, document_with};
    use crate::types::DocumentMeta;
    use chrono::Utc;

    fn seeded() -> (MemoryStore, MemoryIndex, DocumentId, Vec<DocumentId>) {
        let store = MemoryStore::new();
        let index = MemoryIndex::new();
        let source = document(&store, &index, "source", &[(0, "alpha beta", [1.0, 0.0])]);
        let neighbors: Vec<DocumentId> = (0..4)
            .map(|i| {
                document(
                    &store,
                    &index,
                    &format!("neighbor {i}"),
                    &[(0, "alpha beta", [1.0, 0.1 * i as f32])],
                )
            })
            .collect();
        (store, index, source, neighbors)
    }

    #[tokio::test]
    async fn test_result_bounded_and_excludes_source() {
        let (store, index, source, _) = seeded();
        let out = retrieve(
            &store,
            &index,
            source,
            &RetrieveOptions {
                top_k: 2,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(out.candidates.len() <= 2);
        assert!(out.candidates.iter().all(|c| c.document_id != source));
    }

    #[tokio::test]
    async fn test_deduplicates_by_document_keeping_max() {
        let store = MemoryStore::new();
        let index = MemoryIndex::new();
        let source = document(&store, &index, "source", &[(0, "text", [1.0, 0.0])]);
        // One target document with two chunks at different similarity.
        let target = document(
            &store,
            &index,
            "target",
            &[(0, "close", [1.0, 0.05]), (1, "far", [0.0, 1.0])],
        );

        let out = retrieve(
            &store,
            &index,
            source,
            &RetrieveOptions {
                top_k: 10,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let hits: Vec<_> = out
            .candidates
            .iter()
            .filter(|c| c.document_id == target)
            .collect();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score > 0.9);
    }

    #[tokio::test]
    async fn test_missing_centroid_is_an_error() {
        let store = MemoryStore::new();
        let index = MemoryIndex::new();
        let id = DocumentId::random();
        store.insert_document(
            DocumentMeta {
                id,
                title: "no centroid".to_string(),
                created_at: Utc::now(),
                centroid: None,
                chunk_count: 3,
            },
            Vec::new(),
        );

        let err = retrieve(
            &store,
            &index,
            id,
            &RetrieveOptions {
                top_k: 5,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::MissingEmbeddings(_)));
    }

    #[tokio::test]
    async fn test_zero_chunk_count_is_an_error() {
        let store = MemoryStore::new();
        let index = MemoryIndex::new();
        let id = DocumentId::random();
        store.insert_document(
            DocumentMeta {
                id,
                title: "empty".to_string(),
                created_at: Utc::now(),
                centroid: Some(vec![1.0, 0.0]),
                chunk_count: 0,
            },
            Vec::new(),
        );

        let err = retrieve(
            &store,
            &index,
            id,
            &RetrieveOptions {
                top_k: 5,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::MissingChunks(_)));
    }

    #[tokio::test]
    async fn test_caller_id_scope_containing_only_source_yields_zero() {
        let (store, index, source, _) = seeded();
        let out = retrieve(
            &store,
            &index,
            source,
            &RetrieveOptions {
                top_k: 5,
                filters: Some(Filter::documents([source])),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(out.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_caller_id_scope_is_merged_not_overwritten() {
        let (store, index, source, neighbors) = seeded();
        let out = retrieve(
            &store,
            &index,
            source,
            &RetrieveOptions {
                top_k: 10,
                filters: Some(Filter::documents([source, neighbors[0]])),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(out.candidates.len(), 1);
        assert_eq!(out.candidates[0].document_id, neighbors[0]);
    }

    #[tokio::test]
    async fn test_override_vector_takes_precedence() {
        let store = MemoryStore::new();
        let index = MemoryIndex::new();
        // Source centroid points one way; the override points the other.
        let source = document_with(
            &store,
            &index,
            "source",
            [1.0, 0.0],
            &[(0, "text", [1.0, 0.0])],
        );
        let sideways = document(&store, &index, "sideways", &[(0, "text", [0.0, 1.0])]);

        let out = retrieve(
            &store,
            &index,
            source,
            &RetrieveOptions {
                top_k: 1,
                override_vector: Some(vec![0.0, 1.0]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(out.candidates[0].document_id, sideways);
    }
}

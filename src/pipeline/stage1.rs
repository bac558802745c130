//! Stage 1: chunk-level prefilter.
//!
//! Narrows the broad Stage 0 candidate set using per-chunk nearest-neighbor
//! scoring before the expensive all-pairs Stage 2 computation. Trades a
//! small recall risk for a large latency saving.

use std::collections::{HashMap, HashSet};

use super::PipelineError;
use super::document_id_from_point;
use crate::index::{Filter, SearchRequest, VectorIndex};
use crate::types::{Candidate, ChunkRecord, DocumentId};

/// Tuning for the prefilter.
#[derive(Debug, Clone)]
pub struct PrefilterOptions {
    /// Maximum candidates surviving the stage.
    pub top_k: usize,
    /// Nearest chunk points fetched per source chunk.
    pub per_chunk_limit: usize,
    /// Cosine level at which a chunk pair counts as a hit.
    pub chunk_threshold: f32,
}

#[derive(Default)]
struct CandidateAggregate {
    /// Chunk pairs scoring at or above the hit threshold.
    hits: u64,
    /// Sum of the best per-source-chunk scores.
    best_sum: f32,
}

/// Narrow `candidates` to at most `top_k` documents.
///
/// The output is always a subset of the input, ranked by hit count, then
/// best-score sum, then document id: deterministic for identical inputs.
pub async fn narrow(
    index: &dyn VectorIndex,
    source_chunks: &[ChunkRecord],
    candidates: &[Candidate],
    options: &PrefilterOptions,
) -> Result<Vec<Candidate>, PipelineError> {
    if candidates.is_empty() || options.top_k == 0 {
        return Ok(Vec::new());
    }

    let candidate_ids: HashSet<DocumentId> =
        candidates.iter().map(|c| c.document_id).collect();
    let scope = Filter::documents(candidate_ids.iter().copied());

    let mut aggregates: HashMap<DocumentId, CandidateAggregate> = HashMap::new();
    for chunk in source_chunks {
        let hits = index
            .search(SearchRequest {
                vector: chunk.embedding.clone(),
                limit: options.per_chunk_limit,
                filter: Some(scope.clone()),
                with_payload: true,
            })
            .await?;

        let mut best_for_chunk: HashMap<DocumentId, f32> = HashMap::new();
        for point in &hits {
            let document_id = document_id_from_point(point)?;
            if !candidate_ids.contains(&document_id) {
                continue;
            }
            if point.score >= options.chunk_threshold {
                aggregates.entry(document_id).or_default().hits += 1;
            }
            best_for_chunk
                .entry(document_id)
                .and_modify(|s| *s = s.max(point.score))
                .or_insert(point.score);
        }
        for (document_id, best) in best_for_chunk {
            aggregates.entry(document_id).or_default().best_sum += best;
        }
    }

    let mut narrowed: Vec<(DocumentId, CandidateAggregate)> = aggregates.into_iter().collect();
    narrowed.sort_by(|(id_a, a), (id_b, b)| {
        b.hits
            .cmp(&a.hits)
            .then_with(|| b.best_sum.total_cmp(&a.best_sum))
            .then_with(|| id_a.cmp(id_b))
    });
    narrowed.truncate(options.top_k);

    Ok(narrowed
        .into_iter()
        .map(|(document_id, agg)| Candidate {
            document_id,
            score: agg.best_sum,
        })
        .collect())
}

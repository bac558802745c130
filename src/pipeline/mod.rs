//! Multi-stage similarity pipeline.
//!
//! A funnel from an entire corpus down to the handful of documents that
//! genuinely share content with the source: centroid retrieval (broad,
//! cheap), chunk-level prefilter (narrower), bidirectional scoring
//! (precise). The orchestrator sequences the stages, bounds Stage 2
//! fan-out, and produces a deterministically ordered result list.

pub mod stage0;
pub mod stage1;
pub mod stage2;

pub use stage0::{RetrieveOptions, RetrievedCandidates};
pub use stage1::PrefilterOptions;
pub use stage2::{ScoreOptions, ScoredCandidate};

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::SearchConfig;
use crate::index::filter::DOCUMENT_ID_FIELD;
use crate::index::{Filter, IndexError, ScoredPoint, VectorIndex};
use crate::store::{DocumentStore, StoreError};
use crate::types::{ChunkMatch, DocumentId, DocumentSummary, SimilarityScores};

/// Errors that abort a search.
///
/// Configuration/data errors (unknown document, missing centroid or chunks,
/// malformed payload) mean upstream processing never completed for that
/// document; they are never retried. Index and store errors are transient
/// from this layer's perspective and surface unretried to the caller.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("unknown document: {0}")]
    UnknownDocument(DocumentId),

    #[error("document {0} has no centroid embedding; upstream processing has not completed")]
    MissingEmbeddings(DocumentId),

    #[error("document {0} has no scorable chunks")]
    MissingChunks(DocumentId),

    #[error("index point {point} has a malformed payload: {reason}")]
    MalformedPayload { point: String, reason: String },

    #[error("search deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("scoring worker failed: {0}")]
    Worker(String),
}

/// Extract the owning document id from a point payload.
pub(crate) fn document_id_from_point(point: &ScoredPoint) -> Result<DocumentId, PipelineError> {
    let value = point.payload.get(DOCUMENT_ID_FIELD).ok_or_else(|| {
        PipelineError::MalformedPayload {
            point: point.id.clone(),
            reason: format!("missing {DOCUMENT_ID_FIELD}"),
        }
    })?;
    let raw = value
        .as_str()
        .ok_or_else(|| PipelineError::MalformedPayload {
            point: point.id.clone(),
            reason: format!("{DOCUMENT_ID_FIELD} is not a string"),
        })?;
    DocumentId::parse(raw).map_err(|e| PipelineError::MalformedPayload {
        point: point.id.clone(),
        reason: format!("{DOCUMENT_ID_FIELD} is not a UUID: {e}"),
    })
}

/// Per-search knobs, defaulted from [`SearchConfig`].
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub stage0_top_k: usize,
    pub stage1_top_k: usize,
    pub stage1_per_chunk_limit: usize,
    pub stage1_chunk_threshold: f32,
    pub stage2_parallel_workers: usize,
    pub cosine_threshold: f32,
    pub jaccard_threshold: f32,
    pub min_chunk_chars: u32,
    pub min_score: f32,
    /// Metadata constraints passed through to Stage 0.
    pub filters: Option<Filter>,
    /// Overall wall-clock budget for the search.
    pub deadline: Option<Duration>,
}

impl From<&SearchConfig> for SearchOptions {
    fn from(config: &SearchConfig) -> Self {
        Self {
            stage0_top_k: config.stage0_top_k,
            stage1_top_k: config.stage1_top_k,
            stage1_per_chunk_limit: config.stage1_per_chunk_limit,
            stage1_chunk_threshold: config.stage1_chunk_threshold,
            stage2_parallel_workers: config.stage2_parallel_workers,
            cosine_threshold: config.cosine_threshold,
            jaccard_threshold: config.jaccard_threshold,
            min_chunk_chars: config.min_chunk_chars,
            min_score: config.min_score,
            filters: None,
            deadline: config.deadline_ms.map(Duration::from_millis),
        }
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

/// One overlapping document, with its coverage scores and accepted matches.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub document: DocumentSummary,
    pub scores: SimilarityScores,
    pub matched_chunks: Vec<ChunkMatch>,
}

/// Per-stage wall-clock times, for observability.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SearchTiming {
    pub stage0_ms: u64,
    pub stage1_ms: u64,
    pub stage2_ms: u64,
    pub total_ms: u64,
}

/// A completed search: ranked results plus timing.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub timing: SearchTiming,
}

/// Orchestrates Stage 0 → Stage 1 → Stage 2 over the index and store seams.
///
/// Each call to [`execute`](Self::execute) is independent; there is no
/// cross-request state. A stage failure aborts the whole search: the
/// consumer is a user investigating overlap who needs trustworthy numbers,
/// not a best-effort answer.
pub struct SimilarityPipeline {
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn DocumentStore>,
}

impl SimilarityPipeline {
    pub fn new(index: Arc<dyn VectorIndex>, store: Arc<dyn DocumentStore>) -> Self {
        Self { index, store }
    }

    /// Run the full funnel for `source_id`.
    ///
    /// Exceeding the configured deadline aborts outstanding Stage 2 work and
    /// returns [`PipelineError::DeadlineExceeded`]; partial results are
    /// never returned.
    pub async fn execute(
        &self,
        source_id: DocumentId,
        options: SearchOptions,
    ) -> Result<SearchOutcome, PipelineError> {
        match options.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.run(source_id, &options))
                .await
                .map_err(|_| PipelineError::DeadlineExceeded(deadline))?,
            None => self.run(source_id, &options).await,
        }
    }

    async fn run(
        &self,
        source_id: DocumentId,
        options: &SearchOptions,
    ) -> Result<SearchOutcome, PipelineError> {
        let started = Instant::now();

        let stage0 = stage0::retrieve(
            self.store.as_ref(),
            self.index.as_ref(),
            source_id,
            &RetrieveOptions {
                top_k: options.stage0_top_k,
                filters: options.filters.clone(),
                override_vector: None,
            },
        )
        .await?;
        let stage0_ms = stage0.elapsed.as_millis() as u64;
        tracing::debug!(
            target: "pipeline",
            source = %source_id,
            candidates = stage0.candidates.len(),
            elapsed_ms = stage0_ms,
            "stage 0 complete"
        );

        let source_chunks: Vec<_> = self
            .store
            .document_chunks(source_id)
            .await?
            .into_iter()
            .filter(|c| c.char_count >= options.min_chunk_chars)
            .collect();
        if source_chunks.is_empty() {
            return Err(PipelineError::MissingChunks(source_id));
        }
        let source_chunks = Arc::new(source_chunks);

        let stage1_started = Instant::now();
        let narrowed = stage1::narrow(
            self.index.as_ref(),
            &source_chunks,
            &stage0.candidates,
            &PrefilterOptions {
                top_k: options.stage1_top_k,
                per_chunk_limit: options.stage1_per_chunk_limit,
                chunk_threshold: options.stage1_chunk_threshold,
            },
        )
        .await?;
        let stage1_ms = stage1_started.elapsed().as_millis() as u64;
        tracing::debug!(
            target: "pipeline",
            source = %source_id,
            candidates = narrowed.len(),
            elapsed_ms = stage1_ms,
            "stage 1 complete"
        );

        let stage2_started = Instant::now();
        let score_options = ScoreOptions {
            cosine_threshold: options.cosine_threshold,
            jaccard_threshold: options.jaccard_threshold,
            min_chunk_chars: options.min_chunk_chars,
        };
        // Bounded fan-out: each worker issues a chunk fetch plus a matrix
        // computation, so concurrency is capped to protect the store.
        let semaphore = Arc::new(Semaphore::new(options.stage2_parallel_workers.max(1)));
        let mut workers = JoinSet::new();
        for candidate in &narrowed {
            let target_id = candidate.document_id;
            let store = Arc::clone(&self.store);
            let source_chunks = Arc::clone(&source_chunks);
            let semaphore = Arc::clone(&semaphore);
            workers.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| PipelineError::Worker("scoring pool closed".to_string()))?;
                let meta = store
                    .document_meta(target_id)
                    .await?
                    .ok_or(PipelineError::UnknownDocument(target_id))?;
                let scored =
                    stage2::score(store.as_ref(), &source_chunks, target_id, &score_options)
                        .await?;
                Ok::<_, PipelineError>((meta, scored))
            });
        }

        let mut results = Vec::with_capacity(narrowed.len());
        while let Some(joined) = workers.join_next().await {
            // The first failure aborts the search; dropping the set cancels
            // the rest.
            let (meta, scored) = joined.map_err(|e| PipelineError::Worker(e.to_string()))??;
            results.push(SearchResult {
                document: DocumentSummary::from(&meta),
                scores: scored.scores,
                matched_chunks: scored.matches,
            });
        }
        let stage2_ms = stage2_started.elapsed().as_millis() as u64;

        results.retain(|r| {
            r.scores.source_score.max(r.scores.target_score) >= options.min_score
        });
        results.sort_by(compare_results);

        let timing = SearchTiming {
            stage0_ms,
            stage1_ms,
            stage2_ms,
            total_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            target: "pipeline",
            source = %source_id,
            results = results.len(),
            total_ms = timing.total_ms,
            "similarity search complete"
        );
        Ok(SearchOutcome { results, timing })
    }
}

/// Total result ordering: target coverage, source coverage, matched target
/// characters, then creation time, title, and id so reruns over identical
/// data produce byte-identical output.
fn compare_results(a: &SearchResult, b: &SearchResult) -> std::cmp::Ordering {
    b.scores
        .target_score
        .total_cmp(&a.scores.target_score)
        .then_with(|| b.scores.source_score.total_cmp(&a.scores.source_score))
        .then_with(|| {
            b.scores
                .matched_target_chars
                .cmp(&a.scores.matched_target_chars)
        })
        .then_with(|| a.document.created_at.cmp(&b.document.created_at))
        .then_with(|| a.document.title.cmp(&b.document.title))
        .then_with(|| a.document.id.cmp(&b.document.id))
}

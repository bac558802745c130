//! Stage 2: bidirectional scoring engine.
//!
//! The precision stage. Vector similarity gates match candidacy, lexical
//! similarity gates acceptance: cosine alone over-matches paraphrases,
//! Jaccard alone misses synonym tolerance, the conjunction targets
//! near-verbatim reuse specifically.

use std::collections::HashMap;

use super::PipelineError;
use crate::scoring::{cosine_similarity, lexical_similarity, meets_lexical_threshold};
use crate::store::DocumentStore;
use crate::types::{ChunkMatch, ChunkRecord, DocumentId, SimilarityScores};

/// Thresholds for match candidacy and acceptance.
#[derive(Debug, Clone, Copy)]
pub struct ScoreOptions {
    /// Minimum cosine similarity for a chunk pair to be a match candidate.
    pub cosine_threshold: f32,
    /// Minimum lexical overlap for a candidate to be accepted. 0 disables
    /// the lexical gate (cosine-only compatibility mode).
    pub jaccard_threshold: f32,
    /// Chunks shorter than this are excluded from scoring on both sides.
    pub min_chunk_chars: u32,
}

/// Accepted matches and document-level coverage for one candidate.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub matches: Vec<ChunkMatch>,
    pub scores: SimilarityScores,
}

/// Score one target document against the source chunks.
///
/// Match assignment is greedy per source chunk: each source chunk takes its
/// single best target above the cosine threshold (ties to the lowest target
/// index). Target chunks may be reused across source chunks; a target that
/// legitimately contains one canonical passage mirrored by several source
/// passages should match all of them. Reused target characters are counted
/// once on the target side.
pub async fn score(
    store: &dyn DocumentStore,
    source_chunks: &[ChunkRecord],
    target_id: DocumentId,
    options: &ScoreOptions,
) -> Result<ScoredCandidate, PipelineError> {
    let target_chunks = store.document_chunks(target_id).await?;
    if target_chunks.is_empty() {
        return Err(PipelineError::MissingChunks(target_id));
    }

    let source: Vec<&ChunkRecord> = source_chunks
        .iter()
        .filter(|c| c.char_count >= options.min_chunk_chars)
        .collect();
    let target: Vec<&ChunkRecord> = target_chunks
        .iter()
        .filter(|c| c.char_count >= options.min_chunk_chars)
        .collect();

    let total_source_chars: u64 = source.iter().map(|c| u64::from(c.char_count)).sum();
    let total_target_chars: u64 = target.iter().map(|c| u64::from(c.char_count)).sum();

    let mut matches = Vec::new();
    let mut matched_source_chars = 0u64;
    // Characters per unique matched target chunk; reuse must not double
    // count on the target side.
    let mut matched_targets: HashMap<u32, u64> = HashMap::new();

    for source_chunk in &source {
        let mut best: Option<(&ChunkRecord, f32)> = None;
        for target_chunk in &target {
            let cosine = cosine_similarity(&source_chunk.embedding, &target_chunk.embedding);
            if cosine < options.cosine_threshold {
                continue;
            }
            // Strict greater-than keeps the lowest target index on ties.
            if best.is_none_or(|(_, s)| cosine > s) {
                best = Some((target_chunk, cosine));
            }
        }
        let Some((target_chunk, cosine)) = best else {
            continue;
        };

        if !meets_lexical_threshold(
            &source_chunk.text,
            &target_chunk.text,
            options.jaccard_threshold,
        ) {
            continue;
        }
        let lexical = lexical_similarity(&source_chunk.text, &target_chunk.text);

        matches.push(ChunkMatch {
            source_index: source_chunk.index,
            target_index: target_chunk.index,
            cosine,
            lexical,
        });
        matched_source_chars += u64::from(source_chunk.char_count);
        matched_targets.insert(target_chunk.index, u64::from(target_chunk.char_count));
    }

    let matched_target_chars: u64 = matched_targets.values().sum();
    let scores = SimilarityScores {
        source_score: coverage(matched_source_chars, total_source_chars),
        target_score: coverage(matched_target_chars, total_target_chars),
        matched_source_chars,
        matched_target_chars,
        avg_lexical: if matches.is_empty() {
            0.0
        } else {
            matches.iter().map(|m| m.lexical).sum::<f32>() / matches.len() as f32
        },
        min_lexical: matches
            .iter()
            .map(|m| m.lexical)
            .fold(f32::NAN, f32::min)
            .max(0.0),
        max_lexical: matches
            .iter()
            .map(|m| m.lexical)
            .fold(0.0, f32::max),
    };

    Ok(ScoredCandidate { matches, scores })
}

/// Coverage fraction with the 0/0 case defined as 0.0.
fn coverage(matched: u64, total: u64) -> f32 {
    if total == 0 {
        return 0.0;
    }
    matched as f32 / total as f32
}

//! Core types shared across the similarity pipeline and cleanup subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Create a new DocumentId from an existing UUID.
    pub fn new(value: Uuid) -> Self {
        Self(value)
    }

    /// Generate a fresh random DocumentId.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from string form, e.g. CLI input.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Document-level metadata needed by the pipeline.
///
/// The centroid and chunk count are written by the upstream embedding
/// pipeline. A document with either missing cannot participate in a search;
/// callers must treat that as a configuration error, not an empty result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub id: DocumentId,

    /// Title used for result display and tie-breaking.
    pub title: String,

    /// Creation timestamp, used for result tie-breaking.
    pub created_at: DateTime<Utc>,

    /// Mean of all chunk embeddings, if the embedding pipeline has run.
    pub centroid: Option<Vec<f32>>,

    /// Number of chunks contributing to scoring, after length exclusion.
    pub chunk_count: u32,
}

impl DocumentMeta {
    /// Whether this document can act as a search subject or target.
    pub fn is_searchable(&self) -> bool {
        self.centroid.is_some() && self.chunk_count > 0
    }
}

/// Lightweight document info attached to each search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl From<&DocumentMeta> for DocumentSummary {
    fn from(meta: &DocumentMeta) -> Self {
        Self {
            id: meta.id,
            title: meta.title.clone(),
            created_at: meta.created_at,
        }
    }
}

/// One chunk of a document's extracted text, with its embedding.
///
/// Chunks are immutable once created. The ordinal index is unique within a
/// document and order-significant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub document_id: DocumentId,

    /// Position of this chunk within the document.
    pub index: u32,

    /// Raw chunk text.
    pub text: String,

    /// Character count, precomputed by the extraction pipeline.
    pub char_count: u32,

    /// Embedding vector; dimensionality is fixed corpus-wide.
    pub embedding: Vec<f32>,
}

/// Transient (document, score) pair produced by Stage 0 or Stage 1.
///
/// Scores rank candidates within a single stage's output only; they are not
/// comparable across different query vectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub document_id: DocumentId,
    pub score: f32,
}

/// An accepted pairing of one source chunk with one target chunk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkMatch {
    /// Ordinal index of the source chunk.
    pub source_index: u32,
    /// Ordinal index of the matched target chunk.
    pub target_index: u32,
    /// Cosine similarity that gated candidacy.
    pub cosine: f32,
    /// Lexical overlap score that gated acceptance.
    pub lexical: f32,
}

/// Per-pair coverage scores and accepted-match statistics.
///
/// Both scores are coverage fractions, not symmetric similarities: a short
/// target fully contained in a long source yields a low `source_score` but a
/// high `target_score`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityScores {
    /// Fraction of the source document's characters covered by matches.
    pub source_score: f32,
    /// Fraction of the target document's characters covered by matches.
    pub target_score: f32,
    /// Characters of source chunks with an accepted match.
    pub matched_source_chars: u64,
    /// Characters of matched target chunks, each unique chunk counted once.
    pub matched_target_chars: u64,
    /// Mean lexical score over accepted matches (0.0 when none).
    pub avg_lexical: f32,
    /// Minimum lexical score over accepted matches (0.0 when none).
    pub min_lexical: f32,
    /// Maximum lexical score over accepted matches (0.0 when none).
    pub max_lexical: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_parse_roundtrip() {
        let id = DocumentId::random();
        let parsed = DocumentId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_searchable_requires_centroid_and_chunks() {
        let mut meta = DocumentMeta {
            id: DocumentId::random(),
            title: "contract.pdf".to_string(),
            created_at: Utc::now(),
            centroid: Some(vec![0.1, 0.2]),
            chunk_count: 3,
        };
        assert!(meta.is_searchable());

        meta.chunk_count = 0;
        assert!(!meta.is_searchable());

        meta.chunk_count = 3;
        meta.centroid = None;
        assert!(!meta.is_searchable());
    }
}

//! Pure similarity scorers with no I/O.
//!
//! Two scorers back the pipeline's two-threshold design: cosine similarity
//! over embeddings gates match candidacy, word-set overlap gates acceptance.

pub mod lexical;
pub mod vector;

pub use lexical::{lexical_similarity, meets_lexical_threshold};
pub use vector::cosine_similarity;

pub mod cleanup;
pub mod config;
pub mod index;
pub mod logging;
pub mod pipeline;
pub mod scoring;
pub mod store;
pub mod types;

#[cfg(test)]
mod test_support;

pub use cleanup::{CleanupMetrics, CleanupQueue, CleanupWorker};
pub use config::Settings;
pub use index::{Filter, MemoryIndex, QdrantIndex, VectorIndex};
pub use pipeline::{PipelineError, SearchOptions, SearchOutcome, SimilarityPipeline};
pub use scoring::{cosine_similarity, lexical_similarity};
pub use store::{DocumentStore, MemoryStore, PostgresStore};
pub use types::{DocumentId, SimilarityScores};

//! Configuration for the overlap detection engine.
//!
//! Layered configuration: defaults, then `docsim.toml`, then environment
//! variable overrides.
//!
//! # Environment Variables
//!
//! Environment variables are prefixed with `DOCSIM_` and use double
//! underscores to separate nested levels:
//! - `DOCSIM_SEARCH__STAGE0_TOP_K=800` sets `search.stage0_top_k`
//! - `DOCSIM_VECTOR_INDEX__URL=http://qdrant:6334` sets `vector_index.url`
//! - `DOCSIM_CLEANUP__MAX_ATTEMPTS=3` sets `cleanup.max_attempts`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Config file name looked up in the working directory.
pub const CONFIG_FILE: &str = "docsim.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema.
    #[serde(default = "default_version")]
    pub version: u32,

    /// Similarity search tuning.
    #[serde(default)]
    pub search: SearchConfig,

    /// ANN index connection.
    #[serde(default)]
    pub vector_index: VectorIndexConfig,

    /// Relational store connection.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Vector cleanup worker tuning.
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Logging levels.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    /// Candidates requested from centroid retrieval (Stage 0).
    #[serde(default = "default_stage0_top_k")]
    pub stage0_top_k: usize,

    /// Candidates surviving the chunk-level prefilter (Stage 1).
    #[serde(default = "default_stage1_top_k")]
    pub stage1_top_k: usize,

    /// Nearest chunk points fetched per source chunk in Stage 1.
    #[serde(default = "default_stage1_per_chunk_limit")]
    pub stage1_per_chunk_limit: usize,

    /// Cosine level at which a chunk pair counts as a Stage 1 hit.
    #[serde(default = "default_stage1_chunk_threshold")]
    pub stage1_chunk_threshold: f32,

    /// Concurrent Stage 2 scoring workers.
    #[serde(default = "default_stage2_parallel_workers")]
    pub stage2_parallel_workers: usize,

    /// Cosine similarity gating Stage 2 match candidacy.
    #[serde(default = "default_cosine_threshold")]
    pub cosine_threshold: f32,

    /// Lexical overlap gating Stage 2 match acceptance. 0 disables.
    #[serde(default = "default_jaccard_threshold")]
    pub jaccard_threshold: f32,

    /// Chunks shorter than this many characters are excluded from scoring.
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: u32,

    /// Drop results whose best coverage score is below this.
    #[serde(default)]
    pub min_score: f32,

    /// Overall search deadline in milliseconds. Absent means no deadline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VectorIndexConfig {
    /// Qdrant gRPC endpoint.
    #[serde(default = "default_index_url")]
    pub url: String,

    /// Collection holding one point per chunk.
    #[serde(default = "default_collection")]
    pub collection: String,

    /// API key, if the cluster requires one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Postgres connection string.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Pool size; searches are read-only and short.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CleanupConfig {
    /// Delete attempts before a task is abandoned.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay in milliseconds; doubles per attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling on the retry delay in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Abandoned tasks kept for operator visibility.
    #[serde(default = "default_failure_history")]
    pub failure_history: usize,
}

impl CleanupConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level: error, warn, info, debug, or trace.
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `pipeline = "debug"`.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_stage0_top_k() -> usize {
    600
}
fn default_stage1_top_k() -> usize {
    250
}
fn default_stage1_per_chunk_limit() -> usize {
    8
}
fn default_stage1_chunk_threshold() -> f32 {
    0.75
}
fn default_stage2_parallel_workers() -> usize {
    num_cpus::get().min(4)
}
fn default_cosine_threshold() -> f32 {
    0.90
}
fn default_jaccard_threshold() -> f32 {
    0.60
}
fn default_min_chunk_chars() -> u32 {
    25
}
fn default_index_url() -> String {
    "http://localhost:6334".to_string()
}
fn default_collection() -> String {
    "document_chunks".to_string()
}
fn default_database_url() -> String {
    "postgres://localhost/docsim".to_string()
}
fn default_max_connections() -> u32 {
    5
}
fn default_max_attempts() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    60_000
}
fn default_failure_history() -> usize {
    50
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            search: SearchConfig::default(),
            vector_index: VectorIndexConfig::default(),
            storage: StorageConfig::default(),
            cleanup: CleanupConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            stage0_top_k: default_stage0_top_k(),
            stage1_top_k: default_stage1_top_k(),
            stage1_per_chunk_limit: default_stage1_per_chunk_limit(),
            stage1_chunk_threshold: default_stage1_chunk_threshold(),
            stage2_parallel_workers: default_stage2_parallel_workers(),
            cosine_threshold: default_cosine_threshold(),
            jaccard_threshold: default_jaccard_threshold(),
            min_chunk_chars: default_min_chunk_chars(),
            min_score: 0.0,
            deadline_ms: None,
        }
    }
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            url: default_index_url(),
            collection: default_collection(),
            api_key: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            failure_history: default_failure_history(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load settings: defaults, then `docsim.toml`, then `DOCSIM_*` env.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Load settings from a specific TOML file path.
    pub fn load_from(path: &Path) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("DOCSIM_").split("__"))
            .extract()
    }

    /// Write the default configuration file.
    ///
    /// Returns an error if the file exists and `force` is false.
    pub fn init_config_file(path: &Path, force: bool) -> std::io::Result<()> {
        if path.exists() && !force {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already exists (use --force to overwrite)", path.display()),
            ));
        }
        let rendered = toml::to_string_pretty(&Settings::default())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.search.stage0_top_k, 600);
        assert_eq!(settings.search.stage1_top_k, 250);
        assert!(settings.search.stage2_parallel_workers >= 1);
        assert!((settings.search.cosine_threshold - 0.90).abs() < 1e-6);
        assert!((settings.search.jaccard_threshold - 0.60).abs() < 1e-6);
        assert_eq!(settings.search.min_score, 0.0);
        assert_eq!(settings.cleanup.max_attempts, 5);
    }

    #[test]
    fn test_cleanup_delay_accessors() {
        let cleanup = CleanupConfig::default();
        assert_eq!(cleanup.base_delay(), Duration::from_millis(1_000));
        assert_eq!(cleanup.max_delay(), Duration::from_millis(60_000));
    }
}

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use docsim::config::{CONFIG_FILE, Settings};
use docsim::index::QdrantIndex;
use docsim::pipeline::{SearchOptions, SimilarityPipeline};
use docsim::store::PostgresStore;
use docsim::types::DocumentId;

#[derive(Parser)]
#[command(name = "docsim")]
#[command(about = "Find documents that substantially overlap a source document")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    Config,

    /// Run a similarity search for one source document
    Search {
        /// Source document id
        document_id: String,

        /// Override the Stage 0 candidate count
        #[arg(long)]
        stage0_top_k: Option<usize>,

        /// Override the Stage 1 candidate count
        #[arg(long)]
        stage1_top_k: Option<usize>,

        /// Drop results whose best coverage score is below this
        #[arg(long)]
        min_score: Option<f32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("failed to load configuration")?;
    docsim::logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { force } => {
            let path = cli.config.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
            Settings::init_config_file(&path, force)?;
            println!("Wrote {}", path.display());
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&settings)?);
        }
        Commands::Search {
            document_id,
            stage0_top_k,
            stage1_top_k,
            min_score,
        } => {
            let source = DocumentId::parse(&document_id)
                .with_context(|| format!("invalid document id: {document_id}"))?;

            let index =
                QdrantIndex::connect(&settings.vector_index).context("qdrant connection failed")?;
            let store = PostgresStore::connect(&settings.storage)
                .await
                .context("database connection failed")?;
            let pipeline = SimilarityPipeline::new(Arc::new(index), Arc::new(store));

            let mut options = SearchOptions::from(&settings.search);
            if let Some(k) = stage0_top_k {
                options.stage0_top_k = k;
            }
            if let Some(k) = stage1_top_k {
                options.stage1_top_k = k;
            }
            if let Some(score) = min_score {
                options.min_score = score;
            }

            let outcome = pipeline.execute(source, options).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }
    Ok(())
}

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use statute_retrieval_core::{
    build_embedder, render, Embedder, EngineConfig, IndexState, RetrievalEngine,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "statute-retrieval", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON engine config; every field is optional.
    #[arg(long, env = "STATUTE_RAG_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the persisted index (overrides the config file).
    #[arg(long, env = "STATUTE_RAG_INDEX_DIR")]
    index_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, chunk and embed the statute, then publish the index.
    Build {
        /// Statute source (PDF or UTF-8 text).
        #[arg(long)]
        source: PathBuf,
        /// Rebuild even if the index already matches the source.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Return the statute passages most relevant to a query.
    Query {
        /// Query text
        #[arg(long)]
        text: String,
        /// Maximum passages to return (defaults to the configured k).
        #[arg(long)]
        k: Option<usize>,
        /// Minimum cosine similarity (defaults to the configured threshold).
        #[arg(long)]
        min_score: Option<f32>,
        /// Print passages as JSON.
        #[arg(long, default_value_t = false, conflicts_with = "context")]
        json: bool,
        /// Print the prompt-ready context block instead of a listing.
        #[arg(long, default_value_t = false)]
        context: bool,
    },
    /// Show index state, manifest and chunks per section.
    Info {
        /// Print status as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(index_dir) = &cli.index_dir {
        config.index_dir = index_dir.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let embedder = build_embedder(&config.embedding).context("configuring embedder")?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        index_dir = %config.index_dir.display(),
        model = %embedder.model_id(),
        "statute-retrieval boot"
    );

    let engine = RetrievalEngine::open(config, embedder)?;

    match cli.command {
        Command::Build { source, force } => {
            let report = engine
                .rebuild(&source, force)
                .await
                .with_context(|| format!("building index from {}", source.display()))?;

            if report.skipped {
                println!(
                    "index already up to date for {} (checksum {}); pass --force to rebuild",
                    report.source_path, report.checksum
                );
            } else {
                println!(
                    "{} chunks indexed from {} at {}",
                    report.chunk_count,
                    report.source_path,
                    Utc::now().to_rfc3339()
                );
                println!(
                    "  model={} dimensions={} checksum={} elapsed_ms={}",
                    report.model_id,
                    report.dimensions,
                    report.checksum,
                    report.elapsed.as_millis()
                );
            }
        }
        Command::Query {
            text,
            k,
            min_score,
            json,
            context,
        } => {
            let retrieval = &engine.config().retrieval;
            let k = k.unwrap_or(retrieval.default_k);
            let min_score = min_score.unwrap_or(retrieval.min_score);

            if engine.state() == IndexState::Empty {
                eprintln!("no index is available; run `statute-retrieval build --source <file>` first");
            }

            let blocks = engine.context_blocks(&text, k, min_score).await?;

            if context {
                println!("{}", render(&blocks));
            } else if json {
                println!("{}", serde_json::to_string_pretty(&blocks)?);
            } else {
                println!("query: {text}");
                if blocks.is_empty() {
                    println!("no passages scored at or above {min_score:.2}");
                }
                for (rank, block) in blocks.iter().enumerate() {
                    println!(
                        "[{}] score={:.4} chunk={} section={}",
                        rank + 1,
                        block.score,
                        block.chunk_id,
                        block.citation
                    );
                    println!("  {}", block.text.replace('\n', "\n  "));
                }
            }
        }
        Command::Info { json } => {
            let status = engine.status();

            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
                return Ok(());
            }

            println!("state: {:?}", status.state);
            println!("index: {}", status.index_dir.display());
            match &status.manifest {
                Some(manifest) => {
                    println!("source: {}", manifest.document.source_path);
                    println!("checksum: {}", manifest.document.checksum);
                    println!(
                        "model: {} ({} dimensions)",
                        manifest.model_id, manifest.dimensions
                    );
                    println!(
                        "chunking: length={} overlap={}",
                        manifest.chunking.length, manifest.chunking.overlap
                    );
                    println!(
                        "chunks: {} (built {})",
                        manifest.chunk_count,
                        manifest.built_at.to_rfc3339()
                    );
                    for section in &status.sections {
                        println!("  {:>4}  {}", section.chunks, section.label);
                    }
                }
                None => println!("no index loaded"),
            }
        }
    }

    Ok(())
}

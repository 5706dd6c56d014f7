//! # Ragdex CLI
//!
//! ```bash
//! ragdex --config ./config/ragdex.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragdex serve` | Start the HTTP server (`/ingest`, `/chat`, `/health`) |
//! | `ragdex ingest [PATH]` | Ingest the full corpus, or one document |
//! | `ragdex ask "<question>"` | One-shot: ingest if needed, retrieve, answer |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ragdex::config::load_config;
use ragdex::engine::RagEngine;
use ragdex::ingest::IngestScope;
use ragdex::models::{IngestOutcome, IngestReport, QueryParams};
use ragdex::server::run_server;

/// Retrieval-augmented question answering over a local document corpus.
#[derive(Parser)]
#[command(
    name = "ragdex",
    about = "Retrieval-augmented question answering over a local document corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragdex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Serves `POST /ingest`, `POST /chat`, and `GET /health` on the
    /// configured bind address. The index starts empty; run an ingest
    /// (via CLI or `POST /ingest`) before querying.
    Serve,

    /// Ingest documents into the index.
    ///
    /// Scans the corpus root for eligible files (txt, md, pdf), skips
    /// documents whose content hash is unchanged, and publishes the result
    /// as one atomic index rebuild.
    Ingest {
        /// Ingest only this document (path relative to the corpus root).
        /// Omit for a full corpus rescan.
        path: Option<String>,

        /// Override the configured worker pool size for this run.
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Ask a question against the corpus and print the answer with sources.
    Ask {
        /// The question text.
        question: String,

        /// Number of chunks to retrieve (default from config, 6).
        #[arg(long)]
        top_k: Option<usize>,

        /// Only use chunks whose document path contains this substring.
        #[arg(long)]
        path_contains: Option<String>,

        /// Only use chunks from exactly this document path.
        #[arg(long)]
        path_exact: Option<String>,

        /// Maximum tokens to generate.
        #[arg(long)]
        num_predict: Option<u32>,

        /// GPU layers hint for the generation backend.
        #[arg(long)]
        num_gpu: Option<u32>,

        /// Sampling temperature.
        #[arg(long)]
        temperature: Option<f32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => run_server(&config).await,

        Commands::Ingest { path, workers } => {
            let mut config = config;
            if let Some(workers) = workers {
                anyhow::ensure!(workers >= 1, "--workers must be >= 1");
                config.ingest.workers = workers;
            }
            let engine = RagEngine::new(config)?;
            let scope = match path {
                Some(p) => IngestScope::Document(p),
                None => IngestScope::All,
            };
            let report = engine.ingest(scope).await?;
            print_report(&report);
            Ok(())
        }

        Commands::Ask {
            question,
            top_k,
            path_contains,
            path_exact,
            num_predict,
            num_gpu,
            temperature,
        } => {
            let engine = Arc::new(RagEngine::new(config)?);
            // One-shot mode has no long-lived index; ingest first.
            let report = engine.ingest(IngestScope::All).await?;
            print_report(&report);

            let params = QueryParams {
                question,
                top_k,
                path_contains,
                path_exact,
                num_predict,
                num_gpu,
                temperature,
            };
            let answer = engine.ask(&params).await?;

            println!("\n{}\n", answer.answer);
            if !answer.sources.is_empty() {
                println!("sources:");
                for source in &answer.sources {
                    println!(
                        "  [{:.3}] {} (chunk {}, confidence {:.2})",
                        source.score,
                        source.path,
                        &source.chunk_id[..12.min(source.chunk_id.len())],
                        source.confidence
                    );
                }
                println!("overall confidence: {:.2}", answer.overall_confidence);
            }
            Ok(())
        }
    }
}

fn print_report(report: &IngestReport) {
    for doc in &report.documents {
        let status = match &doc.outcome {
            IngestOutcome::Indexed { chunks } => format!("indexed ({} chunks)", chunks),
            IngestOutcome::Unchanged => "unchanged".to_string(),
            IngestOutcome::Empty => "empty (no extractable text)".to_string(),
            IngestOutcome::Failed { reason } => format!("failed: {}", reason),
            IngestOutcome::Skipped => "skipped (cancelled)".to_string(),
            IngestOutcome::Removed => "removed".to_string(),
        };
        println!("  {} - {}", doc.path, status);
    }
    println!(
        "ingest: {} indexed, {} unchanged, {} failed, {} chunks",
        report.docs_indexed, report.docs_unchanged, report.docs_failed, report.chunks_indexed
    );
}

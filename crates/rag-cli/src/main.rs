//! RAG CLI - Command-line interface for fused retrieval and answer synthesis.

mod fixture;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use rag_core::{FusionMode, RagConfig};
use rag_llm::EchoLlm;
use rag_synth::{AnswerBody, MultiModalSynthesizer, QueryEngine};

use crate::fixture::Fixture;

/// rag - Multi-retriever fusion and multi-modal answer synthesis
#[derive(Parser)]
#[command(name = "rag")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/rag-fusion/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Retrieve and fuse results, printed as JSON
    Retrieve {
        /// Search query
        query: String,

        /// Fixture describing the retrievers
        #[arg(short, long)]
        fixture: PathBuf,

        /// Fusion mode (reciprocal_rank, relative_score, distance_based_score, simple, ...)
        #[arg(short, long)]
        mode: Option<FusionMode>,

        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Total number of queries, including the original
        #[arg(short, long)]
        num_queries: Option<usize>,
    },

    /// Retrieve and synthesize an answer
    Ask {
        /// Question
        query: String,

        /// Fixture describing the retrievers
        #[arg(short, long)]
        fixture: PathBuf,

        /// Fusion mode
        #[arg(short, long)]
        mode: Option<FusionMode>,

        /// Print the answer as it is generated
        #[arg(short, long)]
        stream: bool,

        /// Attach images to the prompt
        #[arg(short, long)]
        image: bool,
    },
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(path: Option<&PathBuf>) -> rag_core::Result<RagConfig> {
    match path {
        Some(path) => RagConfig::load(path),
        None => RagConfig::load_default(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let mut config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Retrieve {
            query,
            fixture,
            mode,
            top_k,
            num_queries,
        } => {
            if let Some(mode) = mode {
                config.retrieval.mode = mode;
            }
            if let Some(top_k) = top_k {
                config.retrieval.similarity_top_k = top_k;
            }
            if let Some(num_queries) = num_queries {
                config.retrieval.num_queries = num_queries;
            }
            retrieve(&query, &fixture, config).await?;
        }
        Commands::Ask {
            query,
            fixture,
            mode,
            stream,
            image,
        } => {
            if let Some(mode) = mode {
                config.retrieval.mode = mode;
            }
            if image {
                config.retrieval.need_image = true;
            }
            if stream {
                config.synthesis.streaming = true;
            }
            ask(&query, &fixture, config).await?;
        }
    }

    Ok(())
}

async fn retrieve(
    query: &str,
    fixture: &PathBuf,
    config: RagConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let retriever = Fixture::load(fixture)?.into_retriever(config.retrieval)?;
    let nodes = retriever.retrieve(query).await?;

    println!("{}", serde_json::to_string_pretty(&nodes)?);
    Ok(())
}

async fn ask(
    query: &str,
    fixture: &PathBuf,
    config: RagConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let retriever = Fixture::load(fixture)?.into_retriever(config.retrieval)?;

    let synthesizer = MultiModalSynthesizer::from_config(&config.synthesis)
        .with_llm(Arc::new(EchoLlm::new()))
        .with_multi_modal_llm(Arc::new(EchoLlm::new()));
    let engine = QueryEngine::new(Arc::new(retriever), synthesizer);

    let answer = engine.query(query, config.synthesis.streaming).await?;

    match answer.body {
        AnswerBody::Text(text) => println!("{}", text),
        AnswerBody::Stream(mut stream) => {
            let mut stdout = std::io::stdout();
            while let Some(delta) = stream.next().await {
                write!(stdout, "{}", delta?)?;
                stdout.flush()?;
            }
            println!();
        }
    }

    println!("\nSources:");
    for node in &answer.source_nodes {
        println!(
            "  [{:.4}] {} ({})",
            node.score_or_zero(),
            node.id,
            node.retriever_tag.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

//! Command-line front end for the adaptive RAG engine.
//!
//! Answers a single question or runs a batch of questions against a JSON
//! document corpus, printing results as JSON.

use adaptive_rag::{
    BatchJob, BatchRunner, ExternalModel, InMemoryRetriever, MultiSourceRetriever, QueryRequest, RagConfig,
    RagService, RetrievalRouter, Retriever, RetrieverType, SourceType, Workflow,
};
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Adaptive retrieval-augmented question answering
#[derive(Parser, Debug)]
#[command(name = "adaptive-rag", version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// JSON array of documents to retrieve from
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Answer one question
    Ask {
        question: String,

        /// adaptive_rag, simple_rag or pure_llm
        #[arg(short, long, default_value = "adaptive_rag")]
        workflow: Workflow,

        /// pdf, stackoverflow or multi_source
        #[arg(short, long)]
        source: Option<RetrieverType>,

        /// Retrieve from these collections instead of a source (repeatable)
        #[arg(long = "collection")]
        collections: Vec<String>,

        /// Base generation temperature
        #[arg(short, long)]
        temperature: Option<f64>,
    },
    /// Run every question in a file (one per line) through one or more workflows
    Batch {
        questions: PathBuf,

        /// Comma-separated workflows
        #[arg(short, long, value_delimiter = ',', default_value = "adaptive_rag")]
        workflows: Vec<Workflow>,

        /// pdf, stackoverflow or multi_source
        #[arg(short, long)]
        source: Option<RetrieverType>,
    },
    /// Print every prompt template as JSON
    Prompts,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Prompts = cli.command {
        println!("{}", serde_json::to_string_pretty(&adaptive_rag::prompts::all())?);
        return Ok(());
    }

    let config = RagConfig::load(cli.config.as_deref()).map_err(|e| anyhow!("Configuration error: {}", e))?;
    let default_source = config.retrieval.default_source;
    let llm = ExternalModel::new(config.llm.clone()).context("Failed to create language model client")?;
    let router = build_router(&config, cli.corpus.as_deref())?;
    let service = RagService::new(config, Arc::new(llm), Arc::new(router))?;

    match cli.command {
        Commands::Ask {
            question,
            workflow,
            source,
            collections,
            temperature,
        } => {
            let mut request = QueryRequest::new(question)
                .with_source(source.unwrap_or(default_source))
                .with_collections(collections);
            if let Some(t) = temperature {
                request = request.with_temperature(t);
            }
            let result = service.execute(workflow, request).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Batch {
            questions,
            workflows,
            source,
        } => {
            let content = std::fs::read_to_string(&questions)
                .with_context(|| format!("Failed to read questions from {}", questions.display()))?;
            let mut job = BatchJob::new(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect(),
            )
            .with_workflows(workflows);
            job.retrieval_source = source.unwrap_or(default_source);

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, finishing the current item and skipping the rest");
                    on_signal.cancel();
                }
            });

            let report = BatchRunner::new(&service)
                .with_cancellation(cancel)
                .run(&job, |progress| {
                    if let Some(item) = progress.completed {
                        tracing::info!(
                            processed = progress.summary.processed(),
                            total = progress.summary.total,
                            workflow = %item.workflow,
                            "Batch item done"
                        );
                    }
                })
                .await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Prompts => unreachable!("handled before configuration is loaded"),
    }

    Ok(())
}

/// Register the corpus under every retrieval source. Without a corpus the
/// router is empty and every retrieval comes back with no documents.
fn build_router(config: &RagConfig, corpus: Option<&Path>) -> Result<RetrievalRouter> {
    let router = RetrievalRouter::new(config.retrieval.k);
    let Some(path) = corpus else {
        tracing::warn!("No corpus given, retrieval will return no documents");
        return Ok(router);
    };

    let all = Arc::new(InMemoryRetriever::from_json_file("collections", path)?);
    let pdf: Arc<dyn Retriever> = Arc::new(all.subset("pdf", SourceType::Pdf));
    let stackoverflow: Arc<dyn Retriever> = Arc::new(all.subset("stackoverflow", SourceType::StackOverflow));
    let multi = Arc::new(MultiSourceRetriever::new(
        vec![
            (RetrieverType::StackOverflow, stackoverflow.clone()),
            (RetrieverType::Pdf, pdf.clone()),
        ],
        config.retrieval.k_per_source,
        config.retrieval.multi_source_total_k,
    ));

    Ok(router
        .with_source(RetrieverType::Pdf, pdf)
        .with_source(RetrieverType::StackOverflow, stackoverflow)
        .with_source(RetrieverType::MultiSource, multi)
        .with_collections(all))
}

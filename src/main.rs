//! # Corpus QA CLI (`cqa`)
//!
//! The `cqa` binary is the primary interface for Corpus QA. It provides
//! commands for database initialization, document ingestion, asking
//! questions, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! cqa --config ./config/cqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cqa init` | Create the SQLite database and run schema migrations |
//! | `cqa ingest <file>` | Extract, chunk, embed, and store a document |
//! | `cqa ask "<question>"` | Answer a question against the corpus |
//! | `cqa serve` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! cqa init --config ./config/cqa.toml
//!
//! # Ingest a contract
//! cqa ingest ./contracts/msa.pdf --title "Master Service Agreement"
//!
//! # Ask in English (default) or Turkish
//! cqa ask "What is the termination notice period?"
//! cqa ask "Fesih bildirim süresi nedir?" --language tr
//!
//! # Start the HTTP API
//! cqa serve --config ./config/cqa.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use corpus_qa::answer::{AnswerOrchestrator, AskRequest};
use corpus_qa::confidence::ConfidencePolicy;
use corpus_qa::config::{load_config, Config};
use corpus_qa::conversation::ConversationStore;
use corpus_qa::db;
use corpus_qa::embedding;
use corpus_qa::extract;
use corpus_qa::ingest::IngestPipeline;
use corpus_qa::llm;
use corpus_qa::migrate;
use corpus_qa::retrieval::RetrievalOrchestrator;
use corpus_qa::server;
use corpus_qa::store::SqliteStore;

/// Corpus QA — confidence-gated retrieval-augmented question answering over
/// a private document corpus.
#[derive(Parser)]
#[command(
    name = "cqa",
    about = "Corpus QA — confidence-gated question answering over a private document corpus",
    version,
    long_about = "Corpus QA ingests documents (extract, chunk, embed, store) and answers \
    natural-language questions by retrieving semantically relevant passages and conditioning \
    a language model on them, refusing to answer when the retrieved evidence is too weak."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (documents,
    /// chunks, chunk_vectors). Idempotent; running it again is safe.
    Init,

    /// Ingest a document into the corpus.
    ///
    /// Extracts text, chunks it, embeds every chunk sequentially, and stores
    /// everything in one transaction. Supports PDF, DOCX, Markdown, and
    /// plain text.
    Ingest {
        /// Path to the document file.
        file: PathBuf,

        /// Document title. Defaults to the file name.
        #[arg(long)]
        title: Option<String>,

        /// Override the content type instead of inferring it from the file
        /// extension.
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Ask a question against the corpus.
    Ask {
        /// The question text.
        query: String,

        /// Number of passages to retrieve.
        #[arg(long)]
        top_k: Option<usize>,

        /// Answer language (en, tr). Defaults to the configured language.
        #[arg(long)]
        language: Option<String>,

        /// Restrict retrieval to a single document id.
        #[arg(long)]
        document: Option<String>,
    },

    /// Start the HTTP API server.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Ingest {
            file,
            title,
            content_type,
        } => run_ingest(&config, &file, title, content_type).await,
        Commands::Ask {
            query,
            top_k,
            language,
            document,
        } => run_ask(&config, query, top_k, language, document).await,
        Commands::Serve => run_serve(&config).await,
    }
}

async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;
    pool.close().await;
    println!("initialized {}", config.db.path.display());
    Ok(())
}

/// Wire the pipeline components from configuration. Shared by the ask,
/// ingest, and serve commands.
async fn build_components(
    config: &Config,
) -> Result<(Arc<AnswerOrchestrator>, Arc<IngestPipeline>)> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool));

    let embedder = embedding::create_service(&config.embedding)?;
    let model = llm::create_model(&config.llm)?;
    let policy = ConfidencePolicy::new(
        config.confidence.min_acceptable,
        config.confidence.low_confidence,
    )?;

    let retrieval = RetrievalOrchestrator::new(embedder.clone(), store.clone(), policy);
    let conversations = Arc::new(ConversationStore::new(
        config.conversation.max_conversations,
        Duration::from_secs(config.conversation.ttl_secs),
    ));
    let orchestrator = Arc::new(AnswerOrchestrator::new(
        retrieval,
        model,
        conversations,
        config.retrieval.default_top_k,
        config.language.default_language()?,
    ));
    let ingest = Arc::new(IngestPipeline::new(
        embedder,
        store,
        config.chunking.max_chunk_size,
        config.chunking.overlap_size,
    ));

    Ok((orchestrator, ingest))
}

async fn run_ingest(
    config: &Config,
    file: &PathBuf,
    title: Option<String>,
    content_type: Option<String>,
) -> Result<()> {
    let (_, ingest) = build_components(config).await?;

    let bytes = std::fs::read(file)
        .with_context(|| format!("failed to read file: {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());

    let content_type = match content_type {
        Some(ct) => ct,
        None => extract::content_type_for_filename(&file_name)
            .with_context(|| format!("cannot infer content type for {file_name}; pass --content-type"))?
            .to_string(),
    };
    let title = title.unwrap_or(file_name);

    let receipt = ingest.ingest(&bytes, &content_type, &title).await?;

    println!("ingested {}", receipt.title);
    println!("  document id: {}", receipt.document_id);
    println!("  chunks: {}", receipt.chunk_count);
    println!("  characters: {}", receipt.character_count);
    println!("  pages: {}", receipt.page_count);
    Ok(())
}

async fn run_ask(
    config: &Config,
    query: String,
    top_k: Option<usize>,
    language: Option<String>,
    document: Option<String>,
) -> Result<()> {
    let (orchestrator, _) = build_components(config).await?;

    let request = AskRequest {
        query,
        top_k,
        document_id: document,
        language,
        conversation_id: None,
    };
    let answer = orchestrator.ask(&request, &CancellationToken::new()).await?;

    println!("{}", answer.answer);
    println!();
    println!(
        "confidence: {} ({})",
        answer.confidence.as_str(),
        answer.confidence_explanation
    );
    if answer.sources.is_empty() {
        println!("sources: none");
    } else {
        println!("sources:");
        for (i, source) in answer.sources.iter().enumerate() {
            let label = match (&source.article_number, &source.article_title) {
                (Some(n), Some(t)) => format!("{} / article {n}: {t}", source.document_title),
                (Some(n), None) => format!("{} / article {n}", source.document_title),
                _ => source.document_title.clone(),
            };
            println!(
                "  {}. [{:.2}] {}",
                i + 1,
                source.similarity_score,
                label
            );
        }
    }
    Ok(())
}

async fn run_serve(config: &Config) -> Result<()> {
    let (orchestrator, ingest) = build_components(config).await?;
    server::run_server(&config.server.bind, orchestrator, ingest).await
}

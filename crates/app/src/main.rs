use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use doc_chat_core::{
    ingest_folder, open_or_ingest, ChatCompletionsClient, ChatSession, Chunker, ChunkingConfig,
    ConfiguredEmbedder, EmbeddingProvider, EmbeddingSettings, EmbeddingStore, IngestionReport, LlmSettings,
    LocalVectorStore, RagConfig, Retriever,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "doc-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Folder scanned (non-recursively) for pdf, docx, json and csv files
    #[arg(long, env = "DOC_CHAT_DOCUMENTS", default_value = "documents")]
    documents: PathBuf,

    /// Vector store directory; its `index` subdirectory marks a finished ingestion
    #[arg(long, env = "DOC_CHAT_STORE", default_value = "/tmp/chroma_db")]
    store: PathBuf,

    /// Maximum chunk size in characters
    #[arg(long, default_value_t = 500)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, default_value_t = 100)]
    chunk_overlap: usize,

    /// Chunks retrieved per question
    #[arg(long, default_value_t = 3)]
    top_k: usize,

    /// Embedding backend; must match the one that built an existing index
    #[arg(long, value_enum, env = "DOC_CHAT_EMBEDDER", default_value_t = EmbedderKind::Onnx)]
    embedder: EmbedderKind,

    /// Embedding model for the onnx and http backends [default: sentence-transformers/all-MiniLM-L6-v2]
    #[arg(long, env = "DOC_CHAT_EMBEDDING_MODEL")]
    embedding_model: Option<String>,

    /// Cache directory for downloaded onnx models
    #[arg(long, env = "DOC_CHAT_MODEL_CACHE", default_value = "/tmp/doc_chat_models")]
    model_cache: PathBuf,

    /// OpenAI-compatible embeddings base URL for the http backend
    #[arg(long, env = "DOC_CHAT_EMBEDDING_URL")]
    embedding_url: Option<String>,

    /// Embedding API key
    #[arg(long, env = "DOC_CHAT_EMBEDDING_API_KEY", hide_env_values = true)]
    embedding_api_key: Option<String>,

    /// Dimension of the onnx or http embedding model
    #[arg(long, default_value_t = 384)]
    embedding_dimensions: usize,

    /// OpenAI-compatible chat completions base URL
    #[arg(long, env = "DOC_CHAT_LLM_URL", default_value = "https://api.groq.com/openai/v1")]
    llm_url: String,

    /// Chat model identifier
    #[arg(long, env = "DOC_CHAT_LLM_MODEL", default_value = "meta-llama/llama-4-scout-17b-16e-instruct")]
    llm_model: String,

    /// Chat API key
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    /// Timeout for every embedding and chat request
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    Onnx,
    Http,
    Ngram,
}

impl From<EmbedderKind> for EmbeddingProvider {
    fn from(kind: EmbedderKind) -> Self {
        match kind {
            EmbedderKind::Onnx => Self::Onnx,
            EmbedderKind::Http => Self::Http,
            EmbedderKind::Ngram => Self::Ngram,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Ingest the documents folder into the store. Adds to an existing index.
    Ingest,
    /// Ask a single question.
    Ask {
        #[arg(long)]
        query: String,
    },
    /// Interactive chat on stdin. `/clear` resets the conversation, `/exit` quits.
    Chat,
    /// Delete the persisted index.
    Reset,
}

impl Cli {
    fn config(&self) -> RagConfig {
        RagConfig {
            documents_dir: self.documents.clone(),
            store_dir: self.store.clone(),
            chunking: ChunkingConfig {
                max_chars: self.chunk_size,
                overlap_chars: self.chunk_overlap,
            },
            top_k: self.top_k,
            embedding: EmbeddingSettings {
                provider: self.embedder.into(),
                model: self.embedding_model.clone(),
                base_url: self.embedding_url.clone(),
                api_key: self.embedding_api_key.clone(),
                dimensions: self.embedding_dimensions,
                model_cache_dir: self.model_cache.clone(),
                ..EmbeddingSettings::default()
            },
            llm: LlmSettings {
                base_url: self.llm_url.clone(),
                model: self.llm_model.clone(),
                api_key: self.llm_api_key.clone(),
                ..LlmSettings::default()
            },
            request_timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.config();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        store = %config.store_dir.display(),
        "doc-chat boot"
    );

    match cli.command {
        Command::Ingest => {
            let embedder = config.build_embedder().context("failed to build embedder")?;
            let chunker = Chunker::new(config.chunking)?;
            let mut store = EmbeddingStore::open(embedder, &config.store_dir)?;
            let report = ingest_folder(&config.documents_dir, &chunker, &mut store)?;
            log_report(&report);
            println!(
                "{} chunks from {} files ingested at {} ({} entries in store)",
                report.chunk_count,
                report.parsed_files.len(),
                Utc::now().to_rfc3339(),
                store.len()
            );
        }
        Command::Ask { query } => {
            let (retriever, llm) = prepare(&config)?;
            let mut session = ChatSession::new(&retriever, &llm);
            let answer = session.ask(&query)?;
            println!("{answer}");
        }
        Command::Chat => {
            let (retriever, llm) = prepare(&config)?;
            run_chat(&retriever, &llm)?;
        }
        Command::Reset => {
            if LocalVectorStore::reset(&config.store_dir)? {
                println!("removed index under {}", config.store_dir.display());
            } else {
                println!("no index under {}", config.store_dir.display());
            }
        }
    }

    Ok(())
}

fn prepare(
    config: &RagConfig,
) -> anyhow::Result<(Retriever<ConfiguredEmbedder, LocalVectorStore>, ChatCompletionsClient)> {
    let llm = config.build_llm().context("failed to configure chat model")?;
    let embedder = config.build_embedder().context("failed to build embedder")?;
    let (store, report) = open_or_ingest(config, embedder)?;
    if let Some(report) = report {
        log_report(&report);
    }
    Ok((Retriever::new(store).with_top_k(config.top_k), llm))
}

fn run_chat(
    retriever: &Retriever<ConfiguredEmbedder, LocalVectorStore>,
    llm: &ChatCompletionsClient,
) -> anyhow::Result<()> {
    let mut session = ChatSession::new(retriever, llm);
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    println!("Ask anything about your ingested docs. /clear resets, /exit quits.");
    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        match line.trim() {
            "" => continue,
            "/exit" => break,
            "/clear" => {
                session.clear();
                println!("(conversation cleared)");
            }
            query => match session.ask(query) {
                Ok(answer) => println!("{answer}\n"),
                Err(error) => {
                    warn!(%error, "turn failed");
                    println!("error: {error}\n");
                }
            },
        }
    }

    Ok(())
}

fn log_report(report: &IngestionReport) {
    if !report.skipped_files.is_empty() {
        warn!(skipped_files = report.skipped_files.len(), "some files were skipped");
        for skipped in &report.skipped_files {
            warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped file");
        }
    }
    info!(
        files = report.parsed_files.len(),
        records = report.record_count,
        chunks = report.chunk_count,
        "ingestion finished"
    );
}

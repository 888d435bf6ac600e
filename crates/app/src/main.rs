use chrono::Utc;
use clap::{Parser, Subcommand};
use research_assistant_core::{
    export_positive, ChunkStrategy, CompletionProvider, DistanceMetric, FeedbackLabel,
    FeedbackStore, IndexProvider, IngestionOptions, IngestionReport, Services, Settings,
    VectorIndex, DEFAULT_TOP_K,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "research-assistant", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Vector index backend (pinecone or qdrant)
    #[arg(long, env = "INDEX_PROVIDER", default_value = "pinecone")]
    index_provider: IndexProvider,

    /// Index (or collection) name
    #[arg(long, env = "PINECONE_INDEX_NAME", default_value = "research-index")]
    index_name: String,

    /// Embedding dimension the index is created with
    #[arg(long, env = "PINECONE_INDEX_DIM", default_value = "1536")]
    index_dim: usize,

    /// Similarity metric used when creating the index
    #[arg(long, env = "INDEX_METRIC", default_value = "cosine")]
    index_metric: DistanceMetric,

    /// Optional namespace inside the index
    #[arg(long, env = "INDEX_NAMESPACE")]
    namespace: Option<String>,

    #[arg(long, env = "PINECONE_API_KEY", hide_env_values = true)]
    pinecone_api_key: Option<String>,

    /// Pinecone control-plane URL
    #[arg(long, env = "PINECONE_CONTROL_URL", default_value = "https://api.pinecone.io")]
    pinecone_control_url: String,

    /// Cloud for serverless index creation
    #[arg(long, env = "PINECONE_CLOUD", default_value = "aws")]
    pinecone_cloud: String,

    /// Region for serverless index creation
    #[arg(long, env = "PINECONE_ENVIRONMENT", default_value = "us-east-1")]
    pinecone_region: String,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    #[arg(long, env = "QDRANT_API_KEY", hide_env_values = true)]
    qdrant_api_key: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    openai_base_url: String,

    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Completion backend (openai or huggingface)
    #[arg(long, env = "COMPLETION_PROVIDER", default_value = "openai")]
    completion_provider: CompletionProvider,

    #[arg(long, env = "CHAT_MODEL", default_value = "gpt-4o-mini")]
    chat_model: String,

    #[arg(long, env = "HUGGINGFACEHUB_API_TOKEN", hide_env_values = true)]
    huggingface_token: Option<String>,

    #[arg(
        long,
        env = "HUGGINGFACE_BASE_URL",
        default_value = "https://api-inference.huggingface.co"
    )]
    huggingface_base_url: String,

    #[arg(long, env = "HUGGINGFACE_MODEL", default_value = "google/flan-t5-large")]
    huggingface_model: String,

    /// SQLite file that stores answer feedback
    #[arg(long, env = "FEEDBACK_DB", default_value = "feedback.db")]
    feedback_db: PathBuf,
}

#[derive(clap::Args)]
struct ChunkArgs {
    /// Maximum characters per chunk
    #[arg(long, default_value = "1000")]
    chunk_size: usize,
    /// Characters shared by consecutive chunks
    #[arg(long, default_value = "100")]
    chunk_overlap: usize,
    /// fixed (positional slicing) or recursive (paragraph/line/word aware)
    #[arg(long, default_value = "fixed")]
    splitter: ChunkStrategy,
}

impl ChunkArgs {
    fn options(&self) -> IngestionOptions {
        IngestionOptions {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            strategy: self.splitter,
            ..IngestionOptions::default()
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Create the vector index if it does not exist yet.
    EnsureIndex,
    /// Ingest every PDF and text file in a folder.
    Ingest {
        /// Folder that contains papers, searched recursively.
        #[arg(long, default_value = "data/papers")]
        folder: PathBuf,
        #[command(flatten)]
        chunking: ChunkArgs,
    },
    /// Ingest a single uploaded PDF or text file.
    Upload {
        #[arg(long)]
        file: PathBuf,
        #[command(flatten)]
        chunking: ChunkArgs,
    },
    /// Ask a question and print the cited answer.
    Ask {
        #[arg(long)]
        query: String,
        /// Number of passages to retrieve.
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Record whether the answer was helpful (yes or no).
        #[arg(long)]
        rate: Option<FeedbackLabel>,
        /// Optional comment stored with negative feedback.
        #[arg(long, default_value = "")]
        comment: String,
    },
    /// Write positively rated answers as prompt/completion JSONL.
    Export {
        #[arg(long, default_value = "fine_tune_input.jsonl")]
        out: PathBuf,
    },
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            index_provider: self.index_provider,
            index_name: self.index_name.clone(),
            index_dimension: self.index_dim,
            index_metric: self.index_metric,
            namespace: self.namespace.clone(),
            pinecone_api_key: self.pinecone_api_key.clone(),
            pinecone_control_url: self.pinecone_control_url.clone(),
            pinecone_cloud: self.pinecone_cloud.clone(),
            pinecone_region: self.pinecone_region.clone(),
            qdrant_url: self.qdrant_url.clone(),
            qdrant_api_key: self.qdrant_api_key.clone(),
            openai_api_key: self.openai_api_key.clone(),
            openai_base_url: self.openai_base_url.clone(),
            embedding_model: self.embedding_model.clone(),
            completion_provider: self.completion_provider,
            chat_model: self.chat_model.clone(),
            huggingface_token: self.huggingface_token.clone(),
            huggingface_base_url: self.huggingface_base_url.clone(),
            huggingface_model: self.huggingface_model.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "research-assistant boot"
    );

    match &cli.command {
        Command::EnsureIndex => {
            let services = Services::from_settings(&cli.settings())?;
            services.index.ensure_index(&services.index_spec).await?;
            println!(
                "index {} ready (dimension {}, metric {})",
                services.index_spec.name, services.index_spec.dimension, services.index_spec.metric
            );
        }
        Command::Ingest { folder, chunking } => {
            let services = Services::from_settings(&cli.settings())?;
            services.index.ensure_index(&services.index_spec).await?;
            let report = services
                .ingestion_pipeline(chunking.options())
                .ingest_folder(folder)
                .await?;
            print_report(&report, &folder.display().to_string());
        }
        Command::Upload { file, chunking } => {
            let services = Services::from_settings(&cli.settings())?;
            services.index.ensure_index(&services.index_spec).await?;
            let report = services
                .ingestion_pipeline(chunking.options())
                .ingest_file(file)
                .await?;
            print_report(&report, &file.display().to_string());
        }
        Command::Ask {
            query,
            top_k,
            rate,
            comment,
        } => {
            let services = Services::from_settings(&cli.settings())?;
            let record = services.answer_pipeline().answer(query, *top_k).await;

            println!("Sources:");
            if record.is_ungrounded() {
                println!("  (none: no passages matched, the answer is not grounded)");
            }
            for source in &record.sources {
                println!("- {}", source.cite);
            }
            println!("---");
            println!("Answer:\n{}", record.answer);

            if let Some(label) = rate {
                let store = FeedbackStore::open(&cli.feedback_db).await?;
                let row = match label {
                    FeedbackLabel::Yes => {
                        store
                            .record_positive(query, &record.answer, &record.sources)
                            .await?
                    }
                    FeedbackLabel::No => {
                        store
                            .record_negative(query, &record.answer, &record.sources, comment)
                            .await?
                    }
                };
                println!("feedback saved as {} ({})", row.label, row.id);
            }
        }
        Command::Export { out } => {
            let store = FeedbackStore::open(&cli.feedback_db).await?;
            let writer = BufWriter::new(File::create(out)?);
            let written = export_positive(&store, writer).await?;
            println!("Exported {written} examples to {}", out.display());
        }
    }

    Ok(())
}

fn print_report(report: &IngestionReport, target: &str) {
    for skipped in &report.skipped_files {
        warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped file");
    }
    if report.chunks == 0 {
        warn!(input = %target, "no chunks were produced; nothing was upserted");
    }
    println!(
        "{} chunks from {} document(s) upserted at {} ({} skipped)",
        report.upserted,
        report.documents,
        Utc::now().to_rfc3339(),
        report.skipped_files.len()
    );
}

pub mod answer;
pub mod chunking;
pub mod completion;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod export;
pub mod extractor;
pub mod feedback;
mod http;
pub mod ingest;
pub mod models;
pub mod prompt;
pub mod stores;
pub mod traits;

pub use answer::{AnswerPipeline, DEFAULT_TOP_K};
pub use chunking::{build_chunks, split_text, ChunkingConfig};
pub use completion::{HuggingFaceModel, OpenAiChatModel};
pub use config::{CompletionProvider, IndexProvider, Services, Settings};
pub use embeddings::{HashingEmbedder, OpenAiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{ConfigError, FeedbackError, IngestError, ServiceError};
pub use export::{export_positive, fine_tune_record, redact_pii, write_jsonl};
pub use extractor::{extract_page_texts, load_document, DocumentFormat, LoadedDocument, PageText};
pub use feedback::FeedbackStore;
pub use ingest::{
    chunk_documents, discover_documents, load_folder, IngestStage, IngestionPipeline,
    IngestionReport, SkippedFile,
};
pub use models::{
    AnswerRecord, ChatMessage, ChatRole, ChunkStrategy, DistanceMetric, DocumentChunk,
    FeedbackLabel, FeedbackRow, FineTuneRecord, IndexSpec, IngestionOptions, QueryMatch,
    SourceCitation, StoredVectorEntry,
};
pub use stores::{MemoryIndex, PineconeStore, QdrantStore};
pub use traits::{CompletionModel, Embedder, VectorIndex};

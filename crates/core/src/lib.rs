pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod retriever;
pub mod store;
pub mod stores;
pub mod traits;

pub use chunking::{Chunker, ChunkingConfig};
pub use config::{EmbeddingProvider, EmbeddingSettings, LlmSettings, RagConfig};
pub use embeddings::{
    CharacterNgramEmbedder, ConfiguredEmbedder, Embedder, HttpEmbedder, HttpEmbedderConfig,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
#[cfg(feature = "onnx")]
pub use embeddings::{OnnxEmbedder, OnnxEmbedderConfig};
pub use error::{ChatError, EmbeddingError, IngestError, LlmError, StoreError};
pub use extractor::{parse_document, LopdfExtractor, PageText, PdfExtractor};
pub use ingest::{
    discover_documents, ingest_folder, open_or_ingest, parse_folder, DiscoveredFiles,
    IngestionReport, ParsedFolder, SkippedFile,
};
pub use llm::{ChatCompletionsClient, ChatCompletionsConfig};
pub use models::{
    ChatMessage, ChatTurn, Chunk, IndexEntry, RecordLocation, RetrievedChunk, Role, ScoredEntry,
    SourceFormat, TextRecord,
};
pub use orchestrator::{build_messages, ChatSession, SessionState};
pub use retriever::{Retriever, DEFAULT_TOP_K};
pub use store::EmbeddingStore;
pub use stores::{LocalVectorStore, StoreManifest};
pub use traits::{LanguageModel, VectorIndex};

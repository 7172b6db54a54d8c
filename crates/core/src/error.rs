use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("parse error in {path}: {details}")]
    Parse { path: String, details: String },

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("store failed: {0}")]
    Store(#[from] StoreError),
}

impl IngestError {
    pub fn parse(path: &std::path::Path, details: impl ToString) -> Self {
        Self::Parse {
            path: path.display().to_string(),
            details: details.to_string(),
        }
    }

    /// Whether the error only concerns the file being read, so a batch may
    /// continue with the next file.
    pub fn is_file_local(&self) -> bool {
        matches!(self, Self::Io(_) | Self::UnsupportedFormat(_) | Self::Parse { .. })
    }
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("invalid embedding configuration: {0}")]
    Config(String),

    #[error("embedding model error: {0}")]
    Model(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("missing api key for {0}")]
    MissingApiKey(String),

    #[error("model returned no answer")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt index entry at line {line}: {details}")]
    Corrupt { line: usize, details: String },

    #[error("vector dimension {actual} does not match store dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("retrieval failed: {0}")]
    Store(#[from] StoreError),

    #[error("llm call failed: {0}")]
    Llm(#[from] LlmError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

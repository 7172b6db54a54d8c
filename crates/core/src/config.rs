use crate::chunking::ChunkingConfig;
use crate::embeddings::{CharacterNgramEmbedder, ConfiguredEmbedder, HttpEmbedder, HttpEmbedderConfig};
#[cfg(feature = "onnx")]
use crate::embeddings::{OnnxEmbedder, OnnxEmbedderConfig};
use crate::llm::{ChatCompletionsClient, ChatCompletionsConfig, DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL};
use crate::retriever::DEFAULT_TOP_K;
use crate::{EmbeddingError, LlmError};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DOCUMENTS_DIR: &str = "documents";
pub const DEFAULT_STORE_DIR: &str = "/tmp/chroma_db";
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_MODEL_EMBEDDING_DIMENSIONS: usize = 384;
pub const DEFAULT_MODEL_CACHE_DIR: &str = "/tmp/doc_chat_models";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
#[cfg(feature = "onnx")]
const MODEL_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbeddingProvider {
    /// sentence-transformers model run locally through ONNX Runtime.
    #[default]
    Onnx,
    /// OpenAI-compatible `/embeddings` endpoint.
    Http,
    /// Hashed character trigrams. Offline and dependency free, not semantic.
    Ngram,
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    /// Model for the ONNX and HTTP providers, [`DEFAULT_EMBEDDING_MODEL`]
    /// when unset.
    pub model: Option<String>,
    /// Required by the HTTP provider.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub dimensions: usize,
    pub max_length: usize,
    pub batch_size: usize,
    pub model_cache_dir: PathBuf,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: None,
            base_url: None,
            api_key: None,
            dimensions: DEFAULT_MODEL_EMBEDDING_DIMENSIONS,
            max_length: 256,
            batch_size: 32,
            model_cache_dir: PathBuf::from(DEFAULT_MODEL_CACHE_DIR),
        }
    }
}

impl EmbeddingSettings {
    fn model_name(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            api_key: None,
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RagConfig {
    pub documents_dir: PathBuf,
    pub store_dir: PathBuf,
    pub chunking: ChunkingConfig,
    pub top_k: usize,
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
    pub request_timeout: Duration,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            documents_dir: PathBuf::from(DEFAULT_DOCUMENTS_DIR),
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            chunking: ChunkingConfig::default(),
            top_k: DEFAULT_TOP_K,
            embedding: EmbeddingSettings::default(),
            llm: LlmSettings::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl RagConfig {
    pub fn build_embedder(&self) -> Result<ConfiguredEmbedder, EmbeddingError> {
        let settings = &self.embedding;
        match settings.provider {
            EmbeddingProvider::Onnx => self.build_onnx_embedder(),
            EmbeddingProvider::Http => {
                let base_url = settings.base_url.clone().ok_or_else(|| {
                    EmbeddingError::Config("the http embedder needs a base url".to_string())
                })?;
                let embedder = HttpEmbedder::new(HttpEmbedderConfig {
                    base_url,
                    model: settings.model_name(),
                    api_key: settings.api_key.clone(),
                    dimensions: settings.dimensions,
                    timeout: self.request_timeout,
                    batch_size: settings.batch_size,
                })?;
                Ok(ConfiguredEmbedder::Http(embedder))
            }
            EmbeddingProvider::Ngram => {
                if let Some(model) = &settings.model {
                    return Err(EmbeddingError::Config(format!(
                        "the n-gram embedder has no model to select, got {model}"
                    )));
                }
                if settings.base_url.is_some() {
                    return Err(EmbeddingError::Config(
                        "the n-gram embedder runs locally and takes no base url".to_string(),
                    ));
                }
                Ok(ConfiguredEmbedder::Ngram(CharacterNgramEmbedder::default()))
            }
        }
    }

    #[cfg(feature = "onnx")]
    fn build_onnx_embedder(&self) -> Result<ConfiguredEmbedder, EmbeddingError> {
        let settings = &self.embedding;
        let embedder = OnnxEmbedder::load(&OnnxEmbedderConfig {
            model: settings.model_name(),
            cache_dir: settings.model_cache_dir.clone(),
            dimensions: settings.dimensions,
            max_length: settings.max_length,
            batch_size: settings.batch_size,
            download_timeout: MODEL_DOWNLOAD_TIMEOUT,
        })?;
        Ok(ConfiguredEmbedder::Onnx(embedder))
    }

    #[cfg(not(feature = "onnx"))]
    fn build_onnx_embedder(&self) -> Result<ConfiguredEmbedder, EmbeddingError> {
        Err(EmbeddingError::Config(
            "built without the `onnx` feature; choose the http or ngram embedder".to_string(),
        ))
    }

    pub fn build_llm(&self) -> Result<ChatCompletionsClient, LlmError> {
        ChatCompletionsClient::new(ChatCompletionsConfig {
            base_url: self.llm.base_url.clone(),
            model: self.llm.model.clone(),
            api_key: self.llm.api_key.clone(),
            temperature: self.llm.temperature,
            timeout: self.request_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{Embedder, NGRAM_MODEL_ID};

    #[test]
    fn defaults_match_the_documented_pipeline() {
        let config = RagConfig::default();
        assert_eq!(config.chunking.max_chars, 500);
        assert_eq!(config.chunking.overlap_chars, 100);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.store_dir, PathBuf::from("/tmp/chroma_db"));
        assert_eq!(config.llm.temperature, 0.0);
    }

    #[test]
    fn default_embedder_is_local_minilm() {
        let settings = RagConfig::default().embedding;
        assert_eq!(settings.provider, EmbeddingProvider::Onnx);
        assert_eq!(settings.model_name(), "sentence-transformers/all-MiniLM-L6-v2");
        assert_eq!(settings.dimensions, 384);
    }

    #[test]
    fn ngram_embedder_is_available_offline() -> Result<(), EmbeddingError> {
        let mut config = RagConfig::default();
        config.embedding.provider = EmbeddingProvider::Ngram;

        let embedder = config.build_embedder()?;

        assert!(matches!(embedder, ConfiguredEmbedder::Ngram(_)));
        assert_eq!(embedder.model_id(), NGRAM_MODEL_ID);
        Ok(())
    }

    #[test]
    fn ngram_embedder_refuses_settings_it_would_ignore() {
        let mut config = RagConfig::default();
        config.embedding.provider = EmbeddingProvider::Ngram;
        config.embedding.model = Some(DEFAULT_EMBEDDING_MODEL.to_string());
        assert!(matches!(config.build_embedder(), Err(EmbeddingError::Config(_))));

        config.embedding.model = None;
        config.embedding.base_url = Some("http://localhost:8080/v1".to_string());
        assert!(matches!(config.build_embedder(), Err(EmbeddingError::Config(_))));
    }

    #[test]
    fn http_embedder_requires_base_url() {
        let mut config = RagConfig::default();
        config.embedding.provider = EmbeddingProvider::Http;
        assert!(matches!(config.build_embedder(), Err(EmbeddingError::Config(_))));
    }

    #[test]
    fn http_embedder_takes_configured_dimensions() -> Result<(), EmbeddingError> {
        let mut config = RagConfig::default();
        config.embedding.provider = EmbeddingProvider::Http;
        config.embedding.base_url = Some("http://localhost:8080/v1".to_string());

        let embedder = config.build_embedder()?;

        assert!(matches!(embedder, ConfiguredEmbedder::Http(_)));
        assert_eq!(embedder.dimensions(), 384);
        assert_eq!(embedder.model_id(), DEFAULT_EMBEDDING_MODEL);
        Ok(())
    }

    #[test]
    fn llm_without_key_is_rejected() {
        assert!(matches!(
            RagConfig::default().build_llm(),
            Err(LlmError::MissingApiKey(_))
        ));
    }
}

use crate::error::EmbeddingError;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use onnx::{OnnxEmbedder, OnnxEmbedderConfig};

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;
pub const NGRAM_MODEL_ID: &str = "char-trigram-hash";

/// Text to fixed-dimension vector. Ingestion and querying must share one
/// implementation or scores are meaningless.
pub trait Embedder {
    fn model_id(&self) -> &str;
    fn dimensions(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        l2_normalize(&mut vector);
        vector
    }
}

fn l2_normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn model_id(&self) -> &str {
        NGRAM_MODEL_ID
    }

    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.vectorize(text))
    }
}

#[derive(Debug, Clone)]
pub struct HttpEmbedderConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub dimensions: usize,
    pub timeout: Duration,
    pub batch_size: usize,
}

/// Blocking client for OpenAI-compatible `/embeddings` endpoints.
pub struct HttpEmbedder {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
    batch_size: usize,
}

impl HttpEmbedder {
    pub fn new(config: HttpEmbedderConfig) -> Result<Self, EmbeddingError> {
        if config.model.trim().is_empty() {
            return Err(EmbeddingError::Config("missing embedding model name".to_string()));
        }
        let endpoint = Url::parse(&format!("{}/embeddings", config.base_url.trim_end_matches('/')))?;
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            model: config.model,
            api_key: config.api_key.filter(|key| !key.trim().is_empty()),
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
        })
    }

    fn request(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut request = self.client.post(self.endpoint.clone()).json(&EmbeddingRequest {
            model: &self.model,
            input: inputs,
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.trim());
        }

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbeddingError::BackendResponse {
                backend: self.endpoint.to_string(),
                details: format!("{status}: {body}"),
            });
        }

        let parsed: EmbeddingResponse = response.json()?;
        vectors_from_response(parsed, inputs.len(), self.dimensions)
    }
}

impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.request(&[text])?
            .pop()
            .ok_or_else(|| EmbeddingError::Request("no embedding returned".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.request(batch)?);
        }
        Ok(vectors)
    }
}

/// Embedder chosen at runtime from configuration.
pub enum ConfiguredEmbedder {
    #[cfg(feature = "onnx")]
    Onnx(OnnxEmbedder),
    Http(HttpEmbedder),
    Ngram(CharacterNgramEmbedder),
}

impl Embedder for ConfiguredEmbedder {
    fn model_id(&self) -> &str {
        match self {
            #[cfg(feature = "onnx")]
            Self::Onnx(embedder) => embedder.model_id(),
            Self::Ngram(embedder) => embedder.model_id(),
            Self::Http(embedder) => embedder.model_id(),
        }
    }

    fn dimensions(&self) -> usize {
        match self {
            #[cfg(feature = "onnx")]
            Self::Onnx(embedder) => embedder.dimensions(),
            Self::Ngram(embedder) => embedder.dimensions(),
            Self::Http(embedder) => embedder.dimensions(),
        }
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        match self {
            #[cfg(feature = "onnx")]
            Self::Onnx(embedder) => embedder.embed(text),
            Self::Ngram(embedder) => embedder.embed(text),
            Self::Http(embedder) => embedder.embed(text),
        }
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        match self {
            #[cfg(feature = "onnx")]
            Self::Onnx(embedder) => embedder.embed_batch(texts),
            Self::Ngram(embedder) => embedder.embed_batch(texts),
            Self::Http(embedder) => embedder.embed_batch(texts),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

fn vectors_from_response(
    mut response: EmbeddingResponse,
    expected: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if response.data.len() != expected {
        return Err(EmbeddingError::Request(format!(
            "{} embeddings returned for {} inputs",
            response.data.len(),
            expected
        )));
    }

    response.data.sort_by_key(|entry| entry.index);
    response
        .data
        .into_iter()
        .map(|entry| {
            if entry.embedding.len() != dimensions {
                return Err(EmbeddingError::Request(format!(
                    "embedding dimension {} != {}",
                    entry.embedding.len(),
                    dimensions
                )));
            }
            Ok(entry.embedding)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedder_is_deterministic() -> Result<(), EmbeddingError> {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Hydraulic pressure and flow")?;
        let second = embedder.embed("Hydraulic pressure and flow")?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn default_ngram_embedder_uses_128_dimensions() -> Result<(), EmbeddingError> {
        let embedder = CharacterNgramEmbedder::default();
        assert_eq!(embedder.dimensions(), 128);
        assert_eq!(embedder.embed("pressure valve")?.len(), DEFAULT_EMBEDDING_DIMENSIONS);
        Ok(())
    }

    #[test]
    fn embedder_outputs_expected_length() -> Result<(), EmbeddingError> {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc")?;
        assert_eq!(vector.len(), 32);
        assert_eq!(embedder.dimensions(), 32);
        Ok(())
    }

    #[test]
    fn response_vectors_are_reordered_by_index() -> Result<(), Box<dyn std::error::Error>> {
        let response: EmbeddingResponse = serde_json::from_str(
            r#"{"data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]}"#,
        )?;

        let vectors = vectors_from_response(response, 2, 2)?;

        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        Ok(())
    }

    #[test]
    fn response_with_wrong_dimension_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let response: EmbeddingResponse =
            serde_json::from_str(r#"{"data": [{"index": 0, "embedding": [1.0]}]}"#)?;

        assert!(vectors_from_response(response, 1, 384).is_err());
        Ok(())
    }

    #[test]
    fn http_embedder_requires_model() {
        let result = HttpEmbedder::new(HttpEmbedderConfig {
            base_url: "http://localhost:8080/v1".to_string(),
            model: " ".to_string(),
            api_key: None,
            dimensions: 384,
            timeout: Duration::from_secs(5),
            batch_size: 16,
        });
        assert!(result.is_err());
    }
}

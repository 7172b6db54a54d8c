//! Local sentence embeddings with ONNX Runtime.
//!
//! Runs a sentence-transformers export (`onnx/model.onnx` + `tokenizer.json`)
//! and mean-pools the last hidden state over the attention mask, the same
//! pooling the Python `sentence-transformers` package applies to MiniLM.

use super::{l2_normalize, Embedder};
use crate::error::EmbeddingError;
use ndarray::{s, Array2, ArrayView2, ArrayView3, Ix3};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};
use tracing::info;

const MODEL_FILE: &str = "model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";
const HUB_BASE_URL: &str = "https://huggingface.co";

#[derive(Debug, Clone)]
pub struct OnnxEmbedderConfig {
    /// Hugging Face repository id, e.g. `sentence-transformers/all-MiniLM-L6-v2`.
    pub model: String,
    /// Files are cached under `<cache_dir>/<model with '/' replaced by "__">`.
    pub cache_dir: PathBuf,
    pub dimensions: usize,
    pub max_length: usize,
    pub batch_size: usize,
    pub download_timeout: Duration,
}

pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    model: String,
    dimensions: usize,
    batch_size: usize,
}

impl OnnxEmbedder {
    /// Loads the model, downloading missing files into the cache first.
    pub fn load(config: &OnnxEmbedderConfig) -> Result<Self, EmbeddingError> {
        if config.model.trim().is_empty() {
            return Err(EmbeddingError::Config("missing embedding model name".to_string()));
        }

        let model_dir = config.cache_dir.join(config.model.replace('/', "__"));
        fs::create_dir_all(&model_dir)?;

        let model_path = model_dir.join(MODEL_FILE);
        let tokenizer_path = model_dir.join(TOKENIZER_FILE);
        let missing: Vec<_> = [
            (format!("onnx/{MODEL_FILE}"), &model_path),
            (TOKENIZER_FILE.to_string(), &tokenizer_path),
        ]
        .into_iter()
        .filter(|(_, path)| !path.is_file())
        .collect();

        if !missing.is_empty() {
            let client = Client::builder().timeout(config.download_timeout).build()?;
            for (remote, path) in missing {
                download(&client, &config.model, &remote, path)?;
            }
        }

        Self::from_files(config, &model_path, &tokenizer_path)
    }

    pub fn from_files(
        config: &OnnxEmbedderConfig,
        model_path: &Path,
        tokenizer_path: &Path,
    ) -> Result<Self, EmbeddingError> {
        info!(model = %config.model, path = %model_path.display(), "loading onnx embedder");

        let session = Session::builder()
            .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|builder| builder.with_intra_threads(4))
            .and_then(|builder| builder.commit_from_file(model_path))
            .map_err(model_error)?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path).map_err(model_error)?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_length.max(1),
                ..TruncationParams::default()
            }))
            .map_err(model_error)?;
        tokenizer.with_padding(Some(PaddingParams::default()));

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            model: config.model.clone(),
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
        })
    }

    fn embed_chunk(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(model_error)?;

        let tokens = encodings
            .iter()
            .map(|encoding| encoding.get_ids().len())
            .max()
            .unwrap_or(0)
            .max(1);
        let mut input_ids = Array2::<i64>::zeros((texts.len(), tokens));
        let mut attention_mask = Array2::<i64>::zeros((texts.len(), tokens));
        let mut token_type_ids = Array2::<i64>::zeros((texts.len(), tokens));

        for (row, encoding) in encodings.iter().enumerate() {
            let columns = encoding
                .get_ids()
                .iter()
                .zip(encoding.get_attention_mask())
                .zip(encoding.get_type_ids())
                .enumerate();
            for (column, ((&id, &mask), &type_id)) in columns {
                input_ids[[row, column]] = i64::from(id);
                attention_mask[[row, column]] = i64::from(mask);
                token_type_ids[[row, column]] = i64::from(type_id);
            }
        }

        let mut session = self
            .session
            .lock()
            .map_err(|_| EmbeddingError::Model("onnx session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => TensorRef::from_array_view(&input_ids).map_err(model_error)?,
                "attention_mask" => TensorRef::from_array_view(&attention_mask).map_err(model_error)?,
                "token_type_ids" => TensorRef::from_array_view(&token_type_ids).map_err(model_error)?,
            ])
            .map_err(model_error)?;

        let hidden = outputs["last_hidden_state"]
            .try_extract_array::<f32>()
            .map_err(model_error)?
            .into_dimensionality::<Ix3>()
            .map_err(model_error)?;

        let width = hidden.dim().2;
        if width != self.dimensions {
            return Err(EmbeddingError::Model(format!(
                "model produced {width}-dimensional vectors, {} configured",
                self.dimensions
            )));
        }

        Ok(mean_pool(hidden, attention_mask.view()))
    }
}

impl Embedder for OnnxEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_chunk(&[text])?
            .pop()
            .ok_or_else(|| EmbeddingError::Model("no embedding produced".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_chunk(batch)?);
        }
        Ok(vectors)
    }
}

/// Average of the token vectors the mask keeps, scaled to unit length.
fn mean_pool(hidden: ArrayView3<'_, f32>, mask: ArrayView2<'_, i64>) -> Vec<Vec<f32>> {
    let (batch, tokens, width) = hidden.dim();

    (0..batch)
        .map(|row| {
            let mut pooled = vec![0f32; width];
            let mut kept = 0f32;
            for token in 0..tokens.min(mask.ncols()) {
                if mask[[row, token]] == 0 {
                    continue;
                }
                kept += 1.0;
                for (sum, value) in pooled.iter_mut().zip(hidden.slice(s![row, token, ..])) {
                    *sum += value;
                }
            }
            if kept > 0.0 {
                for value in &mut pooled {
                    *value /= kept;
                }
            }
            l2_normalize(&mut pooled);
            pooled
        })
        .collect()
}

fn download(client: &Client, model: &str, remote: &str, path: &Path) -> Result<(), EmbeddingError> {
    let url = format!("{HUB_BASE_URL}/{model}/resolve/main/{remote}");
    info!(%url, "downloading embedding model file");

    let mut response = client.get(&url).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(EmbeddingError::BackendResponse {
            backend: url,
            details: status.to_string(),
        });
    }

    // written beside the target first so an interrupted download is never loaded
    let partial = path.with_extension("part");
    let mut file = File::create(&partial)?;
    let bytes = response.copy_to(&mut file)?;
    file.sync_all()?;
    fs::rename(&partial, path)?;

    info!(path = %path.display(), bytes, "model file cached");
    Ok(())
}

fn model_error(error: impl ToString) -> EmbeddingError {
    EmbeddingError::Model(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array3};

    #[test]
    fn mean_pool_skips_masked_tokens() -> Result<(), Box<dyn std::error::Error>> {
        // two sentences, three token slots, two-wide hidden states
        let hidden = Array3::from_shape_vec(
            (2, 3, 2),
            vec![
                3.0, 0.0, 1.0, 4.0, 100.0, 100.0, //
                0.0, 2.0, 9.0, 9.0, 9.0, 9.0,
            ],
        )?;
        let mask = arr2(&[[1_i64, 1, 0], [1, 0, 0]]);

        let pooled = mean_pool(hidden.view(), mask.view());

        assert_eq!(pooled.len(), 2);
        // mean of (3,0) and (1,4) is (2,2), normalized
        let half_root = std::f32::consts::FRAC_1_SQRT_2;
        assert!((pooled[0][0] - half_root).abs() < 1e-6);
        assert!((pooled[0][1] - half_root).abs() < 1e-6);
        assert_eq!(pooled[1], vec![0.0, 1.0]);
        Ok(())
    }

    #[test]
    fn fully_masked_row_stays_zero() {
        let hidden = Array3::<f32>::ones((1, 2, 3));
        let mask = Array2::<i64>::zeros((1, 2));

        let pooled = mean_pool(hidden.view(), mask.view());

        assert_eq!(pooled, vec![vec![0.0; 3]]);
    }

    #[test]
    fn load_rejects_blank_model_name() {
        let config = OnnxEmbedderConfig {
            model: " ".to_string(),
            cache_dir: std::env::temp_dir(),
            dimensions: 384,
            max_length: 256,
            batch_size: 32,
            download_timeout: Duration::from_secs(1),
        };
        assert!(matches!(OnnxEmbedder::load(&config), Err(EmbeddingError::Config(_))));
    }

    #[test]
    fn unreadable_model_file_is_a_model_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let model_path = dir.path().join(MODEL_FILE);
        let tokenizer_path = dir.path().join(TOKENIZER_FILE);
        fs::write(&model_path, b"not an onnx graph")?;
        fs::write(&tokenizer_path, b"{}")?;
        let config = OnnxEmbedderConfig {
            model: "local/test".to_string(),
            cache_dir: dir.path().to_path_buf(),
            dimensions: 384,
            max_length: 256,
            batch_size: 32,
            download_timeout: Duration::from_secs(1),
        };

        let result = OnnxEmbedder::from_files(&config, &model_path, &tokenizer_path);

        assert!(matches!(result, Err(EmbeddingError::Model(_))));
        Ok(())
    }
}

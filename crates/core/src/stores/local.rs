use crate::traits::VectorIndex;
use crate::{IndexEntry, ScoredEntry, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const INDEX_DIR: &str = "index";
const ENTRIES_FILE: &str = "entries.jsonl";
const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreManifest {
    pub embedding_model: String,
    pub dimensions: usize,
    pub created_at: DateTime<Utc>,
}

/// Append-only vector index persisted under `<root>/index` as JSON Lines.
///
/// All entries are held in memory and searched by a linear cosine scan.
/// Appending the same chunks twice stores them twice.
#[derive(Debug)]
pub struct LocalVectorStore {
    root: PathBuf,
    manifest: Option<StoreManifest>,
    manifest_pending: bool,
    entries: Vec<IndexEntry>,
}

impl LocalVectorStore {
    pub fn index_dir(root: &Path) -> PathBuf {
        root.join(INDEX_DIR)
    }

    /// Presence of the index directory is the only freshness signal.
    pub fn exists(root: &Path) -> bool {
        Self::index_dir(root).is_dir()
    }

    /// Loads an existing index or starts an empty one. Nothing is written
    /// until the first append.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let index_dir = Self::index_dir(&root);

        let manifest_path = index_dir.join(MANIFEST_FILE);
        let manifest = if manifest_path.is_file() {
            let file = File::open(&manifest_path)?;
            Some(serde_json::from_reader(BufReader::new(file))?)
        } else {
            None
        };

        let entries_path = index_dir.join(ENTRIES_FILE);
        let entries = if entries_path.is_file() {
            read_entries(&entries_path)?
        } else {
            Vec::new()
        };

        debug!(root = %root.display(), entries = entries.len(), "opened vector store");

        Ok(Self {
            root,
            manifest,
            manifest_pending: false,
            entries,
        })
    }

    /// Deletes the persisted index. Returns whether anything was removed.
    pub fn reset(root: &Path) -> Result<bool, StoreError> {
        let index_dir = Self::index_dir(root);
        if !index_dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&index_dir)?;
        info!(path = %index_dir.display(), "vector store reset");
        Ok(true)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> Option<&StoreManifest> {
        self.manifest.as_ref()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Records the embedding model on first use and rejects a later embedder
    /// of a different dimension. A new manifest is written together with the
    /// first successful append.
    pub fn ensure_manifest(&mut self, embedding_model: &str, dimensions: usize) -> Result<(), StoreError> {
        if let Some(existing) = self.dimensions() {
            if existing != dimensions {
                return Err(StoreError::DimensionMismatch {
                    expected: existing,
                    actual: dimensions,
                });
            }
        }
        if self.manifest.is_some() {
            return Ok(());
        }

        self.manifest = Some(StoreManifest {
            embedding_model: embedding_model.to_string(),
            dimensions,
            created_at: Utc::now(),
        });
        self.manifest_pending = true;
        Ok(())
    }

    fn persist(&mut self, entries: &[IndexEntry]) -> Result<(), StoreError> {
        let index_dir = Self::index_dir(&self.root);
        fs::create_dir_all(&index_dir)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(index_dir.join(ENTRIES_FILE))?;
        let mut writer = BufWriter::new(file);
        for entry in entries {
            serde_json::to_writer(&mut writer, entry)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        if let (true, Some(manifest)) = (self.manifest_pending, &self.manifest) {
            let mut writer = BufWriter::new(File::create(index_dir.join(MANIFEST_FILE))?);
            serde_json::to_writer_pretty(&mut writer, manifest)?;
            writer.flush()?;
            self.manifest_pending = false;
        }
        Ok(())
    }

    /// An index directory left behind by a failed first write would make
    /// the store look ingested.
    fn discard_partial_index(&self) {
        let index_dir = Self::index_dir(&self.root);
        if !index_dir.exists() {
            return;
        }
        if let Err(error) = fs::remove_dir_all(&index_dir) {
            warn!(path = %index_dir.display(), %error, "could not remove partial index");
        }
    }
}

impl VectorIndex for LocalVectorStore {
    fn dimensions(&self) -> Option<usize> {
        self.manifest
            .as_ref()
            .map(|manifest| manifest.dimensions)
            .or_else(|| self.entries.first().map(|entry| entry.vector.len()))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn next_sequence(&self) -> u64 {
        self.entries
            .last()
            .map(|entry| entry.sequence.saturating_add(1))
            .unwrap_or(0)
    }

    fn bind_embedder(&mut self, model_id: &str, dimensions: usize) -> Result<(), StoreError> {
        self.ensure_manifest(model_id, dimensions)
    }

    fn append_entries(&mut self, entries: Vec<IndexEntry>) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }

        let expected = self
            .dimensions()
            .unwrap_or_else(|| entries[0].vector.len());
        if let Some(entry) = entries.iter().find(|entry| entry.vector.len() != expected) {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: entry.vector.len(),
            });
        }

        if let Err(error) = self.persist(&entries) {
            if self.entries.is_empty() {
                self.discard_partial_index();
            }
            return Err(error);
        }

        info!(
            path = %Self::index_dir(&self.root).display(),
            appended = entries.len(),
            total = self.entries.len() + entries.len(),
            "index entries persisted"
        );
        self.entries.extend(entries);
        Ok(())
    }

    fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<ScoredEntry>, StoreError> {
        if top_k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(expected) = self.dimensions() {
            if query_vector.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: query_vector.len(),
                });
            }
        }

        let mut scored: Vec<(&IndexEntry, f64)> = self
            .entries
            .iter()
            .map(|entry| {
                let score = cosine_similarity(query_vector, &entry.vector).unwrap_or(0.0);
                (entry, score)
            })
            .collect();

        scored.sort_by(|(left, left_score), (right, right_score)| {
            right_score
                .total_cmp(left_score)
                .then_with(|| left.sequence.cmp(&right.sequence))
        });
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(entry, score)| ScoredEntry {
                entry: entry.clone(),
                score,
            })
            .collect())
    }
}

fn read_entries(path: &Path) -> Result<Vec<IndexEntry>, StoreError> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(&line).map_err(|error| StoreError::Corrupt {
            line: index + 1,
            details: error.to_string(),
        })?;
        entries.push(entry);
    }

    Ok(entries)
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x64 = f64::from(x);
        let y64 = f64::from(y);
        dot += x64 * y64;
        norm_a += x64 * x64;
        norm_b += y64 * y64;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some(dot / denom)
}

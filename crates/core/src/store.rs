use crate::embeddings::Embedder;
use crate::stores::LocalVectorStore;
use crate::traits::VectorIndex;
use crate::{Chunk, IndexEntry, IngestError, ScoredEntry, StoreError};
use chrono::Utc;
use std::path::PathBuf;
use tracing::info;

/// Embeds chunks with one fixed embedder and keeps them in a vector index.
pub struct EmbeddingStore<E, V> {
    embedder: E,
    index: V,
}

impl<E> EmbeddingStore<E, LocalVectorStore>
where
    E: Embedder,
{
    /// Opens (or prepares) the on-disk store under `root`.
    pub fn open(embedder: E, root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::new(embedder, LocalVectorStore::open(root)?)
    }
}

impl<E, V> EmbeddingStore<E, V>
where
    E: Embedder,
    V: VectorIndex,
{
    pub fn new(embedder: E, index: V) -> Result<Self, StoreError> {
        if let Some(expected) = index.dimensions() {
            if expected != embedder.dimensions() {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: embedder.dimensions(),
                });
            }
        }
        Ok(Self { embedder, index })
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn index(&self) -> &V {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Embeds and persists every chunk. Nothing is deduplicated: adding the
    /// same chunks again stores them again.
    pub fn add(&mut self, chunks: &[Chunk]) -> Result<usize, IngestError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        let vectors = self.embedder.embed_batch(&texts)?;
        if vectors.len() != chunks.len() {
            return Err(IngestError::InvalidArgument(format!(
                "embedding count {} doesn't match chunk count {}",
                vectors.len(),
                chunks.len()
            )));
        }

        self.index
            .bind_embedder(self.embedder.model_id(), self.embedder.dimensions())?;

        let first_sequence = self.index.next_sequence();
        let ingested_at = Utc::now();
        let entries: Vec<IndexEntry> = chunks
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(offset, (chunk, vector))| IndexEntry {
                sequence: first_sequence + offset as u64,
                chunk: chunk.clone(),
                vector,
                ingested_at,
            })
            .collect();

        let added = entries.len();
        self.index.append_entries(entries)?;
        info!(added, total = self.index.len(), model = self.embedder.model_id(), "chunks embedded");
        Ok(added)
    }

    pub fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredEntry>, StoreError> {
        self.index.search(vector, top_k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::{RecordLocation, SourceFormat};
    use tempfile::tempdir;

    fn chunk(index: u64, text: &str) -> Chunk {
        Chunk {
            chunk_id: format!("chunk-{index}"),
            source_path: "/docs/notes.json".to_string(),
            format: SourceFormat::Json,
            location: RecordLocation::Element(index as usize),
            record_index: index,
            chunk_index: 0,
            text: text.to_string(),
        }
    }

    #[test]
    fn stored_chunk_is_top_hit_for_its_own_embedding() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let embedder = CharacterNgramEmbedder::default();
        let mut store = EmbeddingStore::open(embedder, dir.path())?;
        store.add(&[
            chunk(0, "hydraulic pump maintenance schedule"),
            chunk(1, "quarterly revenue grew by ten percent"),
            chunk(2, "employee onboarding checklist"),
        ])?;

        let probe = embedder.embed("quarterly revenue grew by ten percent")?;
        let hits = store.query(&probe, 1)?;

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.chunk.chunk_id, "chunk-1");
        Ok(())
    }

    #[test]
    fn empty_store_query_is_empty() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let embedder = CharacterNgramEmbedder::default();
        let store = EmbeddingStore::open(embedder, dir.path())?;

        let hits = store.query(&embedder.embed("anything")?, 3)?;

        assert!(hits.is_empty());
        Ok(())
    }

    #[test]
    fn re_adding_duplicates_entries() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let embedder = CharacterNgramEmbedder::default();
        let chunks = [chunk(0, "pressure relief valve"), chunk(1, "coolant loop")];

        let mut store = EmbeddingStore::open(embedder, dir.path())?;
        store.add(&chunks)?;
        drop(store);

        let mut store = EmbeddingStore::open(embedder, dir.path())?;
        store.add(&chunks)?;
        assert_eq!(store.len(), 4);

        let hits = store.query(&embedder.embed("pressure relief valve")?, 2)?;
        assert_eq!(hits[0].entry.chunk.chunk_id, "chunk-0");
        assert_eq!(hits[1].entry.chunk.chunk_id, "chunk-0");
        assert!(hits[0].entry.sequence < hits[1].entry.sequence);
        Ok(())
    }

    #[test]
    fn opening_with_a_different_dimension_fails() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut store = EmbeddingStore::open(CharacterNgramEmbedder { dimensions: 16 }, dir.path())?;
        store.add(&[chunk(0, "alpha beta")])?;

        let reopened = EmbeddingStore::open(CharacterNgramEmbedder { dimensions: 32 }, dir.path());

        assert!(matches!(reopened, Err(StoreError::DimensionMismatch { .. })));
        Ok(())
    }

    #[test]
    fn opening_does_not_create_the_index() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut store = EmbeddingStore::open(CharacterNgramEmbedder::default(), dir.path())?;
        assert!(!LocalVectorStore::exists(dir.path()));

        store.add(&[])?;
        assert!(!LocalVectorStore::exists(dir.path()));
        Ok(())
    }
}

use crate::embeddings::Embedder;
use crate::store::EmbeddingStore;
use crate::traits::VectorIndex;
use crate::{ChatError, RetrievedChunk};

pub const DEFAULT_TOP_K: usize = 3;

/// Query-time view over an [`EmbeddingStore`].
pub struct Retriever<E, V> {
    store: EmbeddingStore<E, V>,
    top_k: usize,
}

impl<E, V> Retriever<E, V>
where
    E: Embedder,
    V: VectorIndex,
{
    pub fn new(store: EmbeddingStore<E, V>) -> Self {
        Self {
            store,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn store(&self) -> &EmbeddingStore<E, V> {
        &self.store
    }

    pub fn into_store(self) -> EmbeddingStore<E, V> {
        self.store
    }

    pub fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>, ChatError> {
        if query.trim().is_empty() {
            return Err(ChatError::EmptyQuery);
        }

        let query_vector = self.store.embedder().embed(query)?;
        let hits = self.store.query(&query_vector, self.top_k)?;
        Ok(hits.into_iter().map(RetrievedChunk::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::{Chunk, RecordLocation, SourceFormat};
    use crate::stores::LocalVectorStore;
    use tempfile::tempdir;

    fn retriever_with(
        root: &std::path::Path,
        texts: &[&str],
    ) -> Result<Retriever<CharacterNgramEmbedder, LocalVectorStore>, Box<dyn std::error::Error>> {
        let mut store = EmbeddingStore::open(CharacterNgramEmbedder::default(), root)?;
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                chunk_id: format!("chunk-{index}"),
                source_path: "/docs/manual.pdf".to_string(),
                format: SourceFormat::Pdf,
                location: RecordLocation::Page(index as u32 + 1),
                record_index: index as u64,
                chunk_index: 0,
                text: text.to_string(),
            })
            .collect();
        store.add(&chunks)?;
        Ok(Retriever::new(store))
    }

    #[test]
    fn returns_default_top_three_with_provenance() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let retriever = retriever_with(
            dir.path(),
            &[
                "replace the air filter every six months",
                "the warranty covers parts for two years",
                "air filter housing is behind the front panel",
                "contact support by email",
                "firmware updates install automatically",
            ],
        )?;

        let hits = retriever.retrieve("air filter")?;

        assert_eq!(hits.len(), 3);
        assert!(hits[0].text.contains("air filter"));
        assert_eq!(hits[0].source_path, "/docs/manual.pdf");
        assert!(matches!(hits[0].location, RecordLocation::Page(_)));
        assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);
        Ok(())
    }

    #[test]
    fn top_k_is_configurable() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let retriever = retriever_with(dir.path(), &["one", "two", "three"])?.with_top_k(1);

        assert_eq!(retriever.retrieve("two")?.len(), 1);
        Ok(())
    }

    #[test]
    fn blank_query_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let retriever = retriever_with(dir.path(), &["one"])?;

        assert!(matches!(retriever.retrieve("   "), Err(ChatError::EmptyQuery)));
        Ok(())
    }
}

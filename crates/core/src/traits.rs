use crate::{ChatMessage, IndexEntry, LlmError, ScoredEntry, StoreError};

pub trait VectorIndex {
    /// Dimension of stored vectors, once known.
    fn dimensions(&self) -> Option<usize>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sequence number the next appended entry will receive.
    fn next_sequence(&self) -> u64;

    /// Records which embedder produces this index's vectors. Called before
    /// every append; nothing is persisted until the append succeeds.
    fn bind_embedder(&mut self, model_id: &str, dimensions: usize) -> Result<(), StoreError>;

    fn append_entries(&mut self, entries: Vec<IndexEntry>) -> Result<(), StoreError>;

    /// Top `top_k` entries by cosine similarity, earliest insertion first on
    /// equal scores.
    fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<ScoredEntry>, StoreError>;
}

pub trait LanguageModel {
    fn model_id(&self) -> &str;

    fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

use crate::domain::{errors::RetrievalError, Embedding, IndexRecord, ScoredRecord};
use async_trait::async_trait;

/// Storage and nearest-neighbor engine holding embeddings plus metadata.
///
/// An index is created with a fixed embedding dimension and keeps it for
/// life; every record and query vector must match it. `upsert` is
/// insert-or-overwrite by record id: each record in a batch lands
/// atomically, but a batch as a whole is not a transaction.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<(), RetrievalError>;

    /// Up to `k` records ordered by the backend's native relevance ranking,
    /// best first. `score` is cosine similarity in [0, 1].
    async fn query(&self, embedding: &Embedding, k: usize)
        -> Result<Vec<ScoredRecord>, RetrievalError>;

    fn dimension(&self) -> usize;

    async fn count(&self) -> Result<usize, RetrievalError>;
}

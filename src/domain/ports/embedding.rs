use crate::domain::{errors::RetrievalError, Embedding};
use async_trait::async_trait;

/// Maps text to fixed-dimension vectors, one per input, order-preserving.
/// Vectors arrive normalized to unit length; the core never normalizes.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Embedding>, RetrievalError>;
    fn dimension(&self) -> usize;
}

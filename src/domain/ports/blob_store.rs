use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Key-prefixed durable blob storage backing index snapshots. The sync
/// layer is the only consumer; its failures never reach retrieval callers.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), BlobStoreError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobStoreError>;

    /// All keys beginning with `prefix`, in no particular order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobStoreError>;

    async fn exists(&self, key: &str) -> Result<bool, BlobStoreError>;
}

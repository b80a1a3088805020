mod blob_store;
mod embedding;
mod index_backend;

pub use blob_store::{BlobStore, BlobStoreError};
pub use embedding::EmbeddingProvider;
pub use index_backend::IndexBackend;

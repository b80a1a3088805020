pub mod blob;
pub mod cache;
pub mod config;
pub mod embedding;
pub mod index;
pub mod sync;

pub use blob::{FsBlobStore, MemoryBlobStore};
pub use cache::{QueryCache, QueryKey};
pub use config::{
    Config, ConfigError, EmbeddingConfig, IndexConfig, RetrievalConfig, ServerConfig, SyncConfig,
};
pub use embedding::TextEmbedding;
pub use index::{LocalIndex, QdrantIndex};
pub use sync::{pull_snapshot, PullOutcome, SyncEvent, SyncHandle};

mod chunk;
mod embedding;

pub use chunk::{Chunk, ChunkMetadata, IndexRecord, ScoredRecord, SearchResult};
pub use embedding::Embedding;

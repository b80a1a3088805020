mod local;
mod qdrant;

pub use local::{LocalIndex, MANIFEST_FILE};
pub use qdrant::QdrantIndex;

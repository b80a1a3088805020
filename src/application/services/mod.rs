mod optimizer;
mod retrieval;

pub use optimizer::{RetrievalOptimizer, DEFAULT_TOP_K};
pub use retrieval::{RetrievalService, INGEST_BATCH_SIZE};

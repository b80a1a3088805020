//! Vector retrieval core: chunk ingestion into an embedding index, cosine
//! similarity search behind a FIFO query cache, and snapshot sync between
//! a local index directory and a blob store.

pub mod api;
pub mod application;
pub mod domain;
pub mod infrastructure;

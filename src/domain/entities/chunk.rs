use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::Embedding;

/// A unit of ingestible text plus its metadata, produced by an external
/// document-processing step (PDF extraction, manual authoring, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(text: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    pub fn chunk_id(&self) -> &str {
        &self.metadata.chunk_id
    }
}

/// Metadata attached to a chunk. `chunk_id` is globally unique across the
/// index; re-adding an existing id fully replaces the stored record.
/// Fields beyond the known ones (table structure, custom tags) ride along
/// in `extra` via serde flattening.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_id: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_num: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChunkMetadata {
    pub fn new(chunk_id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            source: source.into(),
            page_num: None,
            content_type: None,
            extra: Map::new(),
        }
    }

    pub fn with_page_num(mut self, page_num: u32) -> Self {
        self.page_num = Some(page_num);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// The persisted pairing of a chunk id, its embedding, and its metadata
/// (text included), owned by the index backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub embedding: Embedding,
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl IndexRecord {
    pub fn from_chunk(chunk: &Chunk, embedding: Embedding) -> Self {
        Self {
            id: chunk.chunk_id().to_string(),
            embedding,
            text: chunk.text.clone(),
            metadata: chunk.metadata.clone(),
        }
    }
}

/// One backend match: similarity score in [0, 1], best first in a result
/// list. Internal to the backend boundary; callers see [`SearchResult`].
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub id: String,
    pub score: f32,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A retrieved chunk as handed to consumers. `distance` is
/// `1 - cosine_similarity`: lower means more relevant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub distance: f32,
}

impl From<ScoredRecord> for SearchResult {
    fn from(record: ScoredRecord) -> Self {
        Self {
            text: record.text,
            metadata: record.metadata,
            distance: 1.0 - record.score,
        }
    }
}

use async_trait::async_trait;
use rig::client::{EmbeddingsClient, ProviderClient};
use rig::embeddings::EmbeddingsBuilder;
use rig::providers::openai;

use crate::domain::{ports::EmbeddingProvider, Embedding, RetrievalError};
use crate::infrastructure::config::EmbeddingConfig;

/// Text embedder backed by the OpenAI embeddings API. Models in this
/// family return unit-length vectors, so dot products downstream are true
/// cosine similarities.
pub struct TextEmbedding {
    model: String,
    dimension: usize,
}

impl TextEmbedding {
    pub fn new() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            model: config.model.clone(),
            dimension: config.dimension,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }
}

impl Default for TextEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for TextEmbedding {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Embedding>, RetrievalError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let client = openai::Client::from_env();
        let model = client.embedding_model(&self.model);

        let mut builder = EmbeddingsBuilder::new(model);
        for text in texts {
            builder = builder
                .document(*text)
                .map_err(|e| RetrievalError::embedding(e.to_string()))?;
        }

        let embeddings = builder
            .build()
            .await
            .map_err(|e| RetrievalError::embedding(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(RetrievalError::embedding(format!(
                "provider returned {} embeddings for {} texts",
                embeddings.len(),
                texts.len()
            )));
        }

        embeddings
            .into_iter()
            .map(|(_doc, emb)| {
                let vector: Vec<f32> = emb.first().vec.into_iter().map(|x| x as f32).collect();
                if vector.len() != self.dimension {
                    return Err(RetrievalError::DimensionMismatch {
                        expected: self.dimension,
                        actual: vector.len(),
                    });
                }
                Ok(Embedding::from(vector))
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_apply_over_defaults() {
        assert_eq!(TextEmbedding::default().dimension(), 1536);
        let custom = TextEmbedding::new()
            .with_model("text-embedding-3-large")
            .with_dimension(3072);
        assert_eq!(custom.dimension(), 3072);
    }
}

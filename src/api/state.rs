use std::sync::Arc;

use crate::application::{RetrievalOptimizer, RetrievalService};
use crate::domain::ports::EmbeddingProvider;

#[derive(Clone)]
pub struct AppState {
    pub embedding: Arc<dyn EmbeddingProvider>,
    pub service: Arc<RetrievalService>,
    pub optimizer: Arc<RetrievalOptimizer>,
}

impl AppState {
    pub fn new(
        embedding: Arc<dyn EmbeddingProvider>,
        service: Arc<RetrievalService>,
        optimizer: Arc<RetrievalOptimizer>,
    ) -> Self {
        Self {
            embedding,
            service,
            optimizer,
        }
    }
}

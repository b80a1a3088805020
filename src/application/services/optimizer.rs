use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use crate::application::services::RetrievalService;
use crate::domain::{Embedding, RetrievalError, SearchResult};

pub const DEFAULT_TOP_K: usize = 3;

const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs searches on a spawned task so the calling context never blocks on
/// index I/O, bounds them with a deadline, and guarantees ascending-distance
/// ordering no matter what order the backend or cache produced.
pub struct RetrievalOptimizer {
    service: Arc<RetrievalService>,
    default_top_k: usize,
    search_timeout: Duration,
}

impl RetrievalOptimizer {
    pub fn new(service: Arc<RetrievalService>) -> Self {
        Self {
            service,
            default_top_k: DEFAULT_TOP_K,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }

    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }

    #[instrument(skip(self, embedding))]
    pub async fn retrieve(
        &self,
        query: &str,
        embedding: &Embedding,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        self.retrieve_top_k(query, embedding, self.default_top_k).await
    }

    #[instrument(skip(self, embedding))]
    pub async fn retrieve_top_k(
        &self,
        query: &str,
        embedding: &Embedding,
        k: usize,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        let service = Arc::clone(&self.service);
        let query = query.to_string();
        let embedding = embedding.clone();
        let mut handle = tokio::spawn(async move { service.search(&query, &embedding, k).await });

        let mut results = match tokio::time::timeout(self.search_timeout, &mut handle).await {
            Ok(Ok(search)) => search?,
            Ok(Err(e)) => {
                return Err(RetrievalError::internal(format!("search task failed: {e}")))
            }
            Err(_) => {
                handle.abort();
                return Err(RetrievalError::timeout("search", self.search_timeout));
            }
        };

        results.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(results)
    }
}

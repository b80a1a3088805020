use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::instrument;

use crate::domain::{
    ports::IndexBackend, Chunk, Embedding, IndexRecord, RetrievalError, SearchResult,
};
use crate::infrastructure::cache::{QueryCache, QueryKey};
use crate::infrastructure::sync::SyncHandle;

/// Upserts are sent to the backend in fixed batches of this size.
pub const INGEST_BATCH_SIZE: usize = 100;

const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Coordinates ingestion and search against one index backend, with a
/// FIFO query cache in front and an optional sync layer behind.
///
/// The cache is never invalidated by ingestion: results cached before an
/// upsert stay visible until they age out. Callers that cannot tolerate
/// that staleness should vary the query or lower the cache capacity.
pub struct RetrievalService {
    backend: Arc<dyn IndexBackend>,
    cache: RwLock<QueryCache>,
    sync: Option<SyncHandle>,
    backend_timeout: Duration,
}

impl RetrievalService {
    pub fn new(backend: Arc<dyn IndexBackend>, cache: QueryCache) -> Self {
        Self {
            backend,
            cache: RwLock::new(cache),
            sync: None,
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }

    /// Attach a sync handle; every successful ingestion schedules a
    /// snapshot push through it.
    pub fn with_sync(mut self, sync: SyncHandle) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    /// Upsert pre-embedded chunks, one backend call per batch of
    /// [`INGEST_BATCH_SIZE`]. Batches are sequential; a failing batch stops
    /// the call and leaves earlier batches ingested. On success every input
    /// chunk is queryable and existing chunk ids are fully replaced.
    #[instrument(skip(self, chunks, embeddings), fields(count = chunks.len()))]
    pub async fn add_documents(
        &self,
        chunks: &[Chunk],
        embeddings: Vec<Embedding>,
    ) -> Result<usize, RetrievalError> {
        if chunks.len() != embeddings.len() {
            return Err(RetrievalError::validation(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        if chunks.is_empty() {
            return Ok(0);
        }

        let expected = self.backend.dimension();
        for embedding in &embeddings {
            if embedding.dimension() != expected {
                return Err(RetrievalError::DimensionMismatch {
                    expected,
                    actual: embedding.dimension(),
                });
            }
        }

        let records: Vec<IndexRecord> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexRecord::from_chunk(chunk, embedding))
            .collect();

        for batch in records.chunks(INGEST_BATCH_SIZE) {
            self.with_timeout("index upsert", self.backend.upsert(batch))
                .await?;
        }

        if let Some(sync) = &self.sync {
            sync.schedule_push();
        }

        Ok(records.len())
    }

    /// Top-`k` search for a pre-embedded query. The cache is keyed on
    /// `(query_text, k)`; a hit returns the cached list without touching
    /// the backend. Results arrive in backend relevance order, best first.
    #[instrument(skip(self, query_embedding))]
    pub async fn search(
        &self,
        query_text: &str,
        query_embedding: &Embedding,
        k: usize,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        if k == 0 {
            return Err(RetrievalError::validation("k must be at least 1"));
        }
        let expected = self.backend.dimension();
        if query_embedding.dimension() != expected {
            return Err(RetrievalError::DimensionMismatch {
                expected,
                actual: query_embedding.dimension(),
            });
        }

        let key = QueryKey::new(query_text, k);
        {
            let cache = self
                .cache
                .read()
                .map_err(|_| RetrievalError::internal("query cache lock poisoned"))?;
            if let Some(results) = cache.get(&key) {
                tracing::debug!("query cache hit");
                return Ok(results.clone());
            }
        }

        let scored = self
            .with_timeout("index query", self.backend.query(query_embedding, k))
            .await?;
        let results: Vec<SearchResult> = scored.into_iter().map(Into::into).collect();

        let mut cache = self
            .cache
            .write()
            .map_err(|_| RetrievalError::internal("query cache lock poisoned"))?;
        cache.insert(key, results.clone());

        Ok(results)
    }

    pub async fn count(&self) -> Result<usize, RetrievalError> {
        self.with_timeout("index count", self.backend.count()).await
    }

    /// Block until every scheduled snapshot push has been attempted. A
    /// no-op when no sync layer is attached; push failures surface as
    /// [`crate::infrastructure::sync::SyncEvent`]s, not here.
    pub async fn flush(&self) -> Result<(), RetrievalError> {
        match &self.sync {
            Some(sync) => sync.flush().await,
            None => Ok(()),
        }
    }

    pub fn sync(&self) -> Option<&SyncHandle> {
        self.sync.as_ref()
    }

    async fn with_timeout<T, F>(&self, operation: &'static str, fut: F) -> Result<T, RetrievalError>
    where
        F: Future<Output = Result<T, RetrievalError>>,
    {
        match tokio::time::timeout(self.backend_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RetrievalError::timeout(operation, self.backend_timeout)),
        }
    }
}

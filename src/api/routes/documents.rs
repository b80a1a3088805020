use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::api::routes::error_status;
use crate::api::state::AppState;
use crate::domain::{Chunk, RetrievalError, SearchResult};

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub ingested: usize,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub k: Option<usize>,
}

/// Embed the chunk texts, then hand chunks and embeddings to the
/// retrieval service for batched upsert.
pub async fn ingest_chunks(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, StatusCode> {
    let texts: Vec<&str> = request.chunks.iter().map(|c| c.text.as_str()).collect();
    let embeddings = state.embedding.embed(&texts).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to embed chunks");
        error_status(&e)
    })?;

    match state.service.add_documents(&request.chunks, embeddings).await {
        Ok(ingested) => Ok(Json(IngestResponse { ingested })),
        Err(e) => {
            tracing::error!(error = %e, "Failed to ingest chunks");
            Err(error_status(&e))
        }
    }
}

/// Embed the query and retrieve the `k` nearest chunks, best (lowest
/// distance) first. An empty corpus answers `200` with `[]`.
pub async fn search_chunks(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Vec<SearchResult>>, StatusCode> {
    let embeddings = state.embedding.embed(&[&request.query]).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to embed query");
        error_status(&e)
    })?;
    let embedding = embeddings.into_iter().next().ok_or_else(|| {
        tracing::error!("Embedding provider returned nothing for the query");
        error_status(&RetrievalError::internal("no query embedding"))
    })?;

    let result = match request.k {
        Some(k) => state.optimizer.retrieve_top_k(&request.query, &embedding, k).await,
        None => state.optimizer.retrieve(&request.query, &embedding).await,
    };

    match result {
        Ok(results) => Ok(Json(results)),
        Err(e) => {
            tracing::error!(error = %e, "Search failed");
            Err(error_status(&e))
        }
    }
}

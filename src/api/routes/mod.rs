pub mod documents;
pub mod health;
pub mod sync;

use axum::http::{header, Method, StatusCode};
use axum::{routing::get, routing::post, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::middleware::logging::request_logger;
use crate::api::state::AppState;
use crate::domain::RetrievalError;

pub fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    let cors = build_cors(allowed_origins);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .nest("/api/v1", api_v1_routes())
        .layer(axum::middleware::from_fn(request_logger))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(origins)
    }
}

fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/documents", post(documents::ingest_chunks))
        .route("/documents/search", post(documents::search_chunks))
        .route("/sync/flush", post(sync::flush))
}

pub(crate) fn error_status(error: &RetrievalError) -> StatusCode {
    match error {
        RetrievalError::Validation(_) | RetrievalError::DimensionMismatch { .. } => {
            StatusCode::BAD_REQUEST
        }
        RetrievalError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{RetrievalOptimizer, RetrievalService};
    use crate::domain::{
        ports::{EmbeddingProvider, IndexBackend},
        Embedding, IndexRecord, ScoredRecord,
    };
    use crate::infrastructure::cache::QueryCache;
    use crate::infrastructure::index::LocalIndex;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use sha2::{Digest, Sha256};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    struct StubEmbedding;

    #[async_trait]
    impl EmbeddingProvider for StubEmbedding {
        async fn embed(
            &self,
            texts: &[&str],
        ) -> Result<Vec<Embedding>, crate::domain::RetrievalError> {
            Ok(texts
                .iter()
                .map(|text| {
                    let digest = Sha256::digest(text.as_bytes());
                    Embedding::new(vec![
                        digest[0] as f32 + 1.0,
                        digest[1] as f32 + 1.0,
                        digest[2] as f32 + 1.0,
                    ])
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl IndexBackend for FailingBackend {
        async fn upsert(&self, _records: &[IndexRecord]) -> Result<(), RetrievalError> {
            Err(RetrievalError::ingestion("index offline"))
        }

        async fn query(
            &self,
            _embedding: &Embedding,
            _k: usize,
        ) -> Result<Vec<ScoredRecord>, RetrievalError> {
            Err(RetrievalError::retrieval("index offline"))
        }

        fn dimension(&self) -> usize {
            3
        }

        async fn count(&self) -> Result<usize, RetrievalError> {
            Err(RetrievalError::retrieval("index offline"))
        }
    }

    async fn test_router() -> (Router, TempDir) {
        let dir = tempdir().unwrap();
        let backend = Arc::new(LocalIndex::open(dir.path(), 3).await.unwrap());
        let service = Arc::new(RetrievalService::new(backend, QueryCache::new(10)));
        let optimizer = Arc::new(RetrievalOptimizer::new(service.clone()));
        let state = AppState::new(Arc::new(StubEmbedding), service, optimizer);
        (create_router(state, &[]), dir)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_then_search_round_trip() {
        let (router, _dir) = test_router().await;

        let ingest = post_json(
            "/api/v1/documents",
            json!({
                "chunks": [
                    {
                        "text": "rust ownership rules",
                        "metadata": { "chunk_id": "c-1", "source": "book.pdf", "page_num": 4 }
                    }
                ]
            }),
        );
        let response = router.clone().oneshot(ingest).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "ingested": 1 }));

        let search = post_json(
            "/api/v1/documents/search",
            json!({ "query": "rust ownership rules", "k": 1 }),
        );
        let response = router.clone().oneshot(search).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let results = body.as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["text"], "rust ownership rules");
        assert_eq!(results[0]["metadata"]["chunk_id"], "c-1");
        assert!(results[0]["distance"].as_f64().unwrap() < 1e-5);
    }

    #[tokio::test]
    async fn test_search_empty_corpus_returns_empty_list() {
        let (router, _dir) = test_router().await;

        let search = post_json("/api/v1/documents/search", json!({ "query": "anything" }));
        let response = router.oneshot(search).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn test_zero_k_is_a_client_error() {
        let (router, _dir) = test_router().await;

        let search = post_json(
            "/api/v1/documents/search",
            json!({ "query": "q", "k": 0 }),
        );
        let response = router.oneshot(search).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_backend_failure_maps_to_server_error() {
        let service = Arc::new(RetrievalService::new(
            Arc::new(FailingBackend),
            QueryCache::new(10),
        ));
        let optimizer = Arc::new(RetrievalOptimizer::new(service.clone()));
        let state = AppState::new(Arc::new(StubEmbedding), service, optimizer);
        let router = create_router(state, &[]);

        let search = post_json("/api/v1/documents/search", json!({ "query": "q" }));
        let response = router.clone().oneshot(search).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = router
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_flush_without_sync_reports_disabled() {
        let (router, _dir) = test_router().await;

        let response = router
            .oneshot(post_json("/api/v1/sync/flush", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "sync_disabled" }));
    }

    #[tokio::test]
    async fn test_health_and_readiness() {
        let (router, _dir) = test_router().await;

        let response = router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ready");
    }
}

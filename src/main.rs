use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use doc_retrieval::api::{create_router, AppState};
use doc_retrieval::application::{RetrievalOptimizer, RetrievalService};
use doc_retrieval::domain::ports::IndexBackend;
use doc_retrieval::infrastructure::{
    Config, FsBlobStore, LocalIndex, QdrantIndex, QueryCache, SyncHandle, TextEmbedding,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=debug,doc_retrieval=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    let (backend, sync): (Arc<dyn IndexBackend>, Option<SyncHandle>) =
        match config.index.backend.as_str() {
            "qdrant" => {
                if config.sync.is_some() {
                    tracing::warn!("snapshot sync only applies to the local backend, ignoring");
                }
                let index = QdrantIndex::connect(
                    &config.index.qdrant_url,
                    &config.index.collection,
                    config.embedding.dimension,
                )
                .await?;
                info!(collection = %config.index.collection, "Qdrant index ready");
                (Arc::new(index), None)
            }
            "local" => {
                // The snapshot pull must land before the index reads its directory.
                let sync = match &config.sync {
                    Some(sync_config) => {
                        let store = Arc::new(FsBlobStore::new(&sync_config.root));
                        let (handle, pull) =
                            SyncHandle::start(&config.index.dir, store, &sync_config.prefix)
                                .await;
                        info!(outcome = ?pull, "snapshot sync enabled");
                        Some(handle)
                    }
                    None => None,
                };
                let index =
                    LocalIndex::open(&config.index.dir, config.embedding.dimension).await?;
                info!(dir = %config.index.dir.display(), "local index ready");
                (Arc::new(index), sync)
            }
            other => anyhow::bail!("unknown index backend: {other}"),
        };

    let mut service = RetrievalService::new(
        backend,
        QueryCache::new(config.retrieval.cache_capacity),
    )
    .with_backend_timeout(Duration::from_millis(config.retrieval.backend_timeout_ms));
    if let Some(sync) = sync {
        service = service.with_sync(sync);
    }
    let service = Arc::new(service);

    let embedding = Arc::new(TextEmbedding::from_config(&config.embedding));
    let optimizer = Arc::new(RetrievalOptimizer::new(service.clone()));

    let state = AppState::new(embedding, service, optimizer);
    let app = create_router(state, &config.server.allowed_origins);

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    info!("API server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::infrastructure::cache::QueryCache;

/// A variable that is set but does not parse fails the load; only an unset
/// variable falls back to its default.
#[derive(Debug, Error)]
#[error("invalid value for {key}: {value:?}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    /// Snapshot sync is off unless a blob store root is configured.
    pub sync: Option<SyncConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Empty, or a `*` entry, allows any origin.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    /// "local" or "qdrant".
    pub backend: String,
    pub dir: PathBuf,
    pub qdrant_url: String,
    pub collection: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    pub cache_capacity: usize,
    pub backend_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub root: PathBuf,
    pub prefix: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let sync = std::env::var("SNAPSHOT_ROOT").ok().map(|root| SyncConfig {
            root: root.into(),
            prefix: env_or("SNAPSHOT_PREFIX", "indexes/main"),
        });

        Ok(Self {
            server: ServerConfig {
                host: env_or("SERVER_HOST", "0.0.0.0"),
                port: env_parse("SERVER_PORT", 8080)?,
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .map(|origins| {
                        origins
                            .split(',')
                            .map(|origin| origin.trim().to_string())
                            .filter(|origin| !origin.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            embedding: EmbeddingConfig {
                model: env_or("EMBEDDING_MODEL", "text-embedding-3-small"),
                dimension: env_parse("EMBEDDING_DIMENSION", 1536)?,
            },
            index: IndexConfig {
                backend: env_or("INDEX_BACKEND", "local"),
                dir: env_or("INDEX_DIR", "data/index").into(),
                qdrant_url: env_or("QDRANT_URL", "http://localhost:6334"),
                collection: env_or("QDRANT_COLLECTION", "chunks"),
            },
            retrieval: RetrievalConfig {
                cache_capacity: env_parse("QUERY_CACHE_CAPACITY", QueryCache::DEFAULT_CAPACITY)?,
                backend_timeout_ms: env_parse("BACKEND_TIMEOUT_MS", 5000)?,
            },
            sync,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                allowed_origins: Vec::new(),
            },
            embedding: EmbeddingConfig {
                model: "text-embedding-3-small".to_string(),
                dimension: 1536,
            },
            index: IndexConfig {
                backend: "local".to_string(),
                dir: "data/index".into(),
                qdrant_url: "http://localhost:6334".to_string(),
                collection: "chunks".to_string(),
            },
            retrieval: RetrievalConfig {
                cache_capacity: QueryCache::DEFAULT_CAPACITY,
                backend_timeout_ms: 5000,
            },
            sync: None,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value.parse().map_err(|_| ConfigError { key, value }),
        Err(_) => Ok(default),
    }
}

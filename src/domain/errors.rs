use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by the retrieval core. An empty result list is a
/// successful answer (`Ok(vec![])`), never an error; callers can rely on
/// the distinction to report "nothing relevant found" separately from a
/// broken backend.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// A batch upsert was rejected. Earlier batches of the same call may
    /// already be ingested; there is no rollback.
    #[error("ingestion failed: {0}")]
    Ingestion(String),

    /// The backend could not answer a query (unreachable, index missing).
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// An embedding's dimension does not match the index's fixed dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The embedding provider failed to vectorize the given texts.
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("validation error: {0}")]
    Validation(String),

    /// A backend round-trip exceeded its deadline.
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl RetrievalError {
    pub fn ingestion(msg: impl Into<String>) -> Self {
        Self::Ingestion(msg.into())
    }

    pub fn retrieval(msg: impl Into<String>) -> Self {
        Self::Retrieval(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn timeout(operation: &'static str, elapsed: Duration) -> Self {
        Self::Timeout { operation, elapsed }
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;

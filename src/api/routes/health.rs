use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::api::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub index: String,
    pub records: Option<usize>,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Ready once the index backend answers a count. A backend that cannot be
/// reached (or times out) reports not ready.
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, StatusCode> {
    match state.service.count().await {
        Ok(records) => Ok(Json(ReadinessResponse {
            status: "ready".into(),
            index: "connected".into(),
            records: Some(records),
        })),
        Err(e) => {
            tracing::warn!(error = %e, "Index backend not reachable");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

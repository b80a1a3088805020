use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::api::routes::error_status;
use crate::api::state::AppState;

#[derive(Debug, Serialize)]
pub struct FlushResponse {
    pub status: String,
}

/// Wait until every pending snapshot push has been attempted. Push
/// failures show up in logs and sync events, not in this response.
pub async fn flush(State(state): State<AppState>) -> Result<Json<FlushResponse>, StatusCode> {
    if state.service.sync().is_none() {
        return Ok(Json(FlushResponse {
            status: "sync_disabled".into(),
        }));
    }

    match state.service.flush().await {
        Ok(()) => Ok(Json(FlushResponse {
            status: "flushed".into(),
        })),
        Err(e) => {
            tracing::error!(error = %e, "Sync flush failed");
            Err(error_status(&e))
        }
    }
}

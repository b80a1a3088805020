use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Access log line per request. Server errors get a `warn` so a failing
/// backend stands out without raising the global log level.
pub async fn request_logger(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let latency_ms = start.elapsed().as_millis();

    if status.is_server_error() {
        tracing::warn!(%method, %path, status = status.as_u16(), latency_ms, "request failed");
    } else {
        tracing::info!(%method, %path, status = status.as_u16(), latency_ms, "request served");
    }

    response
}

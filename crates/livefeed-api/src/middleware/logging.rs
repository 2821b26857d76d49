//! Per-request access log.

use std::time::Instant;

use axum::extract::Request;
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, info};

/// Logs method, path, status and latency of each request.
///
/// Health checks log at debug. WebSocket upgrades are tagged so the access
/// log lines up with the `conn_id` lines from the engine.
pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let upgrade = request
        .headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    if path == "/api/health" {
        debug!(method = %method, path = %path, status, latency_ms, "Health check");
    } else if upgrade {
        info!(path = %path, status, latency_ms, "WebSocket upgrade");
    } else {
        info!(method = %method, path = %path, status, latency_ms, "HTTP request");
    }

    response
}

//! Request logging middleware

use std::time::Instant;

use axum::{body::Body, extract::Request, middleware::Next, response::Response};
use tracing::{debug, info, warn};

/// Workers post here every few seconds; successful calls are logged at debug
const QUIET_PATH_PREFIX: &str = "/api/judge_server_heartbeat";

/// Log each request with its status class and latency
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let status = response.status();
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    if status.is_server_error() {
        warn!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = %format!("{:.2}", duration_ms),
            "Request failed"
        );
    } else if status.is_client_error() {
        // Rejected heartbeats usually mean a worker carries the wrong token
        warn!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            "Request rejected"
        );
    } else if path.starts_with(QUIET_PATH_PREFIX) {
        debug!(
            path = %path,
            duration_ms = %format!("{:.2}", duration_ms),
            "Heartbeat accepted"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = %format!("{:.2}", duration_ms),
            "Request completed"
        );
    }

    response
}

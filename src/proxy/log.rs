//! Per-request access logging.
//!
//! Wraps every handler; emits one structured line after the response is
//! produced, for successes and locally-generated errors alike. Purely
//! observational, never alters the response.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

/// Record method, path, response status, and latency for one request.
pub async fn access_log(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let start = Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request handled"
    );
    response
}

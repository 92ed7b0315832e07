//! Request/response logging middleware.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

/// Logs request method, path, status, and duration under a per-request span.
pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = Uuid::now_v7();
    let start = Instant::now();

    let span = info_span!("request", %request_id, %method, %path);
    let response = next.run(request).instrument(span.clone()).await;

    let status = response.status();
    span.in_scope(|| {
        info!(
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "HTTP request"
        );
    });

    response
}

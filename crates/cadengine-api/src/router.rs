//! Route definitions for the CAD Engine HTTP API.
//!
//! Status routes are open; conversion routes sit behind the rate limiter
//! and a body limit slightly above the upload ceiling (multipart framing).

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware;
use crate::middleware::compression::build_compression_layer;
use crate::middleware::cors::build_cors_layer;
use crate::middleware::panic::build_catch_panic_layer;
use crate::state::AppState;

/// Bytes allowed on top of the upload ceiling for multipart boundaries and
/// part headers.
pub const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.limits.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let cors = build_cors_layer(&state.config.server.cors);

    Router::new()
        .merge(status_routes())
        .merge(convert_routes(state.clone()).layer(DefaultBodyLimit::max(body_limit)))
        .layer(build_catch_panic_layer())
        .layer(axum_middleware::from_fn(middleware::logging::request_logging))
        .layer(build_compression_layer())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Service info and health.
fn status_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health))
}

/// STEP/IGES to STL conversion, rate limited per client.
fn convert_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/convert/step-to-stl",
            post(handlers::convert::convert_to_stl),
        )
        .route(
            "/convert/step-to-stl-base64",
            post(handlers::convert::convert_to_base64),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::rate_limit::rate_limit,
        ))
}

//! Turns a panicking request into a generic 500 response.
//!
//! Temp files owned by the request are released by `TempScope` drops during
//! unwinding; this layer only guarantees the client still gets a response.

use std::any::Any;

use axum::response::{IntoResponse, Response};
use tower_http::catch_panic::CatchPanicLayer;

use cadengine_core::error::AppError;

use crate::error::ApiError;

/// Handler signature accepted by [`CatchPanicLayer::custom`].
pub type PanicHandler = fn(Box<dyn Any + Send + 'static>) -> Response;

/// Builds the catch-panic layer.
pub fn build_catch_panic_layer() -> CatchPanicLayer<PanicHandler> {
    CatchPanicLayer::custom(handle_panic as PanicHandler)
}

/// Answer with the internal-error body; the payload is logged, never sent.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };

    ApiError::from(AppError::internal(format!("handler panicked: {detail}"))).into_response()
}

//! # cadengine-api
//!
//! HTTP API layer for the CAD Engine built on Axum.
//!
//! Provides the status and conversion endpoints, middleware (rate limiting,
//! CORS, logging, compression), DTOs, error mapping, and the response body
//! that keeps a conversion's temp files alive until it has been sent.

pub mod app;
pub mod body;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::{build_app, run_server};
pub use error::ApiError;
pub use state::AppState;

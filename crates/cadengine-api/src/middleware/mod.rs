//! Axum middleware stack.

pub mod compression;
pub mod cors;
pub mod logging;
pub mod panic;
pub mod rate_limit;

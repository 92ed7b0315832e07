//! Application state shared across all handlers and middleware.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use cadengine_converter::ConversionPipeline;
use cadengine_core::config::AppConfig;

use crate::middleware::rate_limit::RateLimiter;

/// Shared application state, cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// The conversion pipeline.
    pub pipeline: Arc<ConversionPipeline>,
    /// Per-client admission control for conversion routes.
    pub limiter: RateLimiter,
    /// Process start time.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Assemble state from loaded configuration and a ready pipeline.
    pub fn new(config: AppConfig, pipeline: ConversionPipeline) -> Self {
        let limiter = RateLimiter::from_config(&config.limits);
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            limiter,
            started_at: Utc::now(),
        }
    }

    /// Seconds since the state was created.
    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}

//! Sliding-window rate limiter middleware.
//!
//! Each client identity keeps a log of admission instants from the last
//! window. A request is admitted while the log holds fewer than `limit`
//! entries. The check-and-record step for one identity runs under that
//! identity's map shard lock, so concurrent requests cannot overshoot.

use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use tokio::time::Instant;

use cadengine_core::config::LimitsConfig;
use cadengine_core::error::AppError;

use crate::error::ApiError;
use crate::state::AppState;

/// Length of the rolling window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Key a request is counted under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Identity derived from the peer address (IP only, port ignored).
    pub fn from_addr(addr: &SocketAddr) -> Self {
        Self(addr.ip().to_string())
    }

    /// The identity key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Request admitted; `remaining` more fit in the current window.
    Allowed {
        /// Admissions left in the window.
        remaining: u32,
    },
    /// Request refused until the oldest admission leaves the window.
    Limited {
        /// Time until the next admission becomes possible.
        retry_after: Duration,
    },
}

/// Per-client admission control.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    windows: Arc<DashMap<ClientIdentity, VecDeque<Instant>>>,
    limit: u32,
    window: Duration,
    enabled: bool,
}

impl RateLimiter {
    /// Limiter admitting `limit` requests per `window` per client.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            limit: limit.max(1),
            window,
            enabled: true,
        }
    }

    /// Limiter from the `[limits]` config section.
    pub fn from_config(config: &LimitsConfig) -> Self {
        let mut limiter = Self::new(config.rate_limit_per_minute, WINDOW);
        limiter.enabled = config.rate_limit_enabled;
        limiter
    }

    /// Admissions allowed per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Whether admission control is active.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Check and, if admitted, record one request for `client`.
    pub fn admit(&self, client: &ClientIdentity) -> Admission {
        if !self.enabled {
            return Admission::Allowed {
                remaining: self.limit,
            };
        }

        let now = Instant::now();
        let mut log = self.windows.entry(client.clone()).or_default();

        while log
            .front()
            .is_some_and(|&oldest| now.duration_since(oldest) >= self.window)
        {
            log.pop_front();
        }

        if log.len() >= self.limit as usize {
            let oldest = log.front().copied().unwrap_or(now);
            return Admission::Limited {
                retry_after: self.window.saturating_sub(now.duration_since(oldest)),
            };
        }

        log.push_back(now);
        Admission::Allowed {
            remaining: self.limit - log.len() as u32,
        }
    }

    /// Drop clients with no admissions inside the window. Returns how many
    /// were removed.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, log| {
            log.back()
                .is_some_and(|&last| now.duration_since(last) < self.window)
        });
        before.saturating_sub(self.windows.len())
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

/// Route layer: refuse over-limit clients before the handler reads the body.
pub async fn rate_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let client = ClientIdentity::from_addr(&addr);

    match state.limiter.admit(&client) {
        Admission::Allowed { .. } => next.run(request).await,
        Admission::Limited { retry_after } => {
            let retry_secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
            state.pipeline.metrics().record_rate_limited();
            tracing::warn!(
                client = %client,
                path = %request.uri().path(),
                retry_after_secs = retry_secs,
                "Rate limit exceeded"
            );

            let err = AppError::rate_limited(format!(
                "Rate limit exceeded: {} per 1 minute",
                state.limiter.limit()
            ))
            .with_details(serde_json::json!({ "retry_after_seconds": retry_secs }));

            let mut response = ApiError::from(err).into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_secs));
            response
        }
    }
}

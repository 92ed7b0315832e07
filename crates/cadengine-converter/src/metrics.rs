//! Conversion counters and latency samples.
//!
//! Counters are atomics; the bounded latency window sits behind a mutex.
//! A [`MetricsSnapshot`] is what the health endpoint reports.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::error::PipelineError;

/// Maximum number of latency samples kept in memory.
const MAX_DURATION_SAMPLES: usize = 1000;

/// Process-wide conversion statistics.
#[derive(Debug, Default)]
pub struct ConversionMetrics {
    started: AtomicU64,
    succeeded: AtomicU64,
    validation_rejected: AtomicU64,
    conversion_failed: AtomicU64,
    internal_errors: AtomicU64,
    rate_limited: AtomicU64,
    input_bytes: AtomicU64,
    output_bytes: AtomicU64,
    durations: Mutex<VecDeque<Duration>>,
}

impl ConversionMetrics {
    /// Empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// A request entered the pipeline.
    pub fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    /// A request produced an STL artifact.
    pub fn record_success(&self, duration: Duration, input_bytes: u64, output_bytes: u64) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.input_bytes.fetch_add(input_bytes, Ordering::Relaxed);
        self.output_bytes.fetch_add(output_bytes, Ordering::Relaxed);
        if let Ok(mut samples) = self.durations.lock() {
            if samples.len() >= MAX_DURATION_SAMPLES {
                samples.pop_front();
            }
            samples.push_back(duration);
        }
    }

    /// A request ended with `err`.
    pub fn record_failure(&self, err: &PipelineError) {
        let counter = match err {
            PipelineError::Validation(_) => &self.validation_rejected,
            PipelineError::Conversion { .. } => &self.conversion_failed,
            PipelineError::Internal { .. } => &self.internal_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// A request was refused admission.
    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut sorted: Vec<Duration> = self
            .durations
            .lock()
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        sorted.sort();

        MetricsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            validation_rejected: self.validation_rejected.load(Ordering::Relaxed),
            conversion_failed: self.conversion_failed.load(Ordering::Relaxed),
            internal_errors: self.internal_errors.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            input_bytes: self.input_bytes.load(Ordering::Relaxed),
            output_bytes: self.output_bytes.load(Ordering::Relaxed),
            duration_p50_ms: percentile_ms(&sorted, 50),
            duration_p95_ms: percentile_ms(&sorted, 95),
            duration_p99_ms: percentile_ms(&sorted, 99),
            sample_count: sorted.len() as u64,
        }
    }
}

fn percentile_ms(sorted: &[Duration], pct: usize) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let index = (sorted.len() - 1) * pct / 100;
    sorted.get(index).map(|d| d.as_millis() as u64)
}

/// Serializable view of [`ConversionMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Requests that entered the pipeline.
    pub started: u64,
    /// Requests that produced an STL.
    pub succeeded: u64,
    /// Requests refused by validation.
    pub validation_rejected: u64,
    /// Requests the kernel could not convert.
    pub conversion_failed: u64,
    /// Requests that hit an internal fault.
    pub internal_errors: u64,
    /// Requests refused by the rate limiter.
    pub rate_limited: u64,
    /// Input bytes of successful conversions.
    pub input_bytes: u64,
    /// STL bytes produced.
    pub output_bytes: u64,
    /// Median successful conversion time.
    pub duration_p50_ms: Option<u64>,
    /// 95th percentile conversion time.
    pub duration_p95_ms: Option<u64>,
    /// 99th percentile conversion time.
    pub duration_p99_ms: Option<u64>,
    /// Latency samples in the window.
    pub sample_count: u64,
}

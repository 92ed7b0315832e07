//! Response DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cadengine_converter::MetricsSnapshot;

/// `GET /` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfoResponse {
    /// Service name.
    pub service: String,
    /// Always `running` when the process answers.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Geometry kernel name.
    pub engine: String,
    /// Deployment environment.
    pub environment: String,
}

/// Kernel status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Kernel name.
    pub name: String,
    /// Whether the kernel can be invoked right now.
    pub available: bool,
    /// Free conversion slots.
    pub available_slots: usize,
    /// Total conversion slots.
    pub max_slots: usize,
}

/// Admission limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsResponse {
    /// Maximum upload size in bytes.
    pub max_file_size_bytes: u64,
    /// Maximum upload size in megabytes.
    pub max_file_size_mb: f64,
    /// Conversions per client per minute.
    pub rate_limit_per_minute: u32,
    /// Whether rate limiting is active.
    pub rate_limit_enabled: bool,
}

/// Process-wide mesh settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionSettingsResponse {
    /// Chordal tolerance.
    pub linear_deflection: f64,
    /// Angular tolerance in radians.
    pub angular_deflection: f64,
    /// `binary` or `ascii`.
    pub output_format: String,
}

/// `GET /health` body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `healthy`.
    pub status: String,
    /// Kernel status.
    pub engine: EngineStatus,
    /// Accepted input and produced output families.
    pub capabilities: Vec<String>,
    /// Admission limits.
    pub limits: LimitsResponse,
    /// Mesh settings.
    pub conversion_settings: ConversionSettingsResponse,
    /// Conversion counters.
    pub conversions: MetricsSnapshot,
    /// Process start time.
    pub started_at: DateTime<Utc>,
    /// Seconds since start.
    pub uptime_seconds: u64,
}

/// Tolerances echoed in the base64 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshQuality {
    /// Chordal tolerance.
    pub linear_deflection: f64,
    /// Angular tolerance in radians.
    pub angular_deflection: f64,
}

/// `POST /convert/step-to-stl-base64` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Base64ConversionResponse {
    /// Always `true`; failures use the error body.
    pub success: bool,
    /// Name the client uploaded.
    pub original_filename: String,
    /// Suggested STL name.
    pub stl_filename: String,
    /// STL size in bytes.
    pub stl_size: u64,
    /// Standard base64 of the STL bytes.
    pub stl_base64: String,
    /// Tolerances used.
    pub mesh_quality: MeshQuality,
}

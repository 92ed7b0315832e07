//! Service status handlers.

use axum::Json;
use axum::extract::State;

use crate::dto::response::{
    ConversionSettingsResponse, EngineStatus, HealthResponse, LimitsResponse, ServiceInfoResponse,
};
use crate::state::AppState;

/// Name reported by the status endpoints.
pub const SERVICE_NAME: &str = "CAD Engine";

/// Families the service accepts and produces.
const CAPABILITIES: [&str; 3] = ["STEP", "IGES", "STL"];

/// GET /
pub async fn root(State(state): State<AppState>) -> Json<ServiceInfoResponse> {
    Json(ServiceInfoResponse {
        service: SERVICE_NAME.to_string(),
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine: state.pipeline.kernel().name().to_string(),
        environment: state.config.environment.clone(),
    })
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let pipeline = &state.pipeline;
    let limits = &state.config.limits;
    let mesh = pipeline.mesh();

    Json(HealthResponse {
        status: "healthy".to_string(),
        engine: EngineStatus {
            name: pipeline.kernel().name().to_string(),
            available: pipeline.kernel().is_available().await,
            available_slots: pipeline.available_slots(),
            max_slots: pipeline.max_slots(),
        },
        capabilities: CAPABILITIES.iter().map(|c| c.to_string()).collect(),
        limits: LimitsResponse {
            max_file_size_bytes: limits.max_upload_bytes,
            max_file_size_mb: limits.max_upload_mb(),
            rate_limit_per_minute: limits.rate_limit_per_minute,
            rate_limit_enabled: state.limiter.is_enabled(),
        },
        conversion_settings: ConversionSettingsResponse {
            linear_deflection: mesh.linear_deflection,
            angular_deflection: mesh.angular_deflection,
            output_format: pipeline.format().as_str().to_string(),
        },
        conversions: pipeline.metrics().snapshot(),
        started_at: state.started_at,
        uptime_seconds: state.uptime_seconds(),
    })
}

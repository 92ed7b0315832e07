//! Upload limits, temp storage, mesh fidelity, and kernel configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Admission and size limits applied to every conversion request.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum accepted upload size in bytes.
    #[validate(range(min = 1))]
    pub max_upload_bytes: u64,
    /// Conversion requests admitted per client per rolling minute.
    #[validate(range(min = 1))]
    pub rate_limit_per_minute: u32,
    /// Whether admission control is active.
    pub rate_limit_enabled: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 50 * 1024 * 1024,
            rate_limit_per_minute: 10,
            rate_limit_enabled: true,
        }
    }
}

impl LimitsConfig {
    /// Upload limit expressed in megabytes, for status reporting.
    pub fn max_upload_mb(&self) -> f64 {
        self.max_upload_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Temp storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding per-request input and output files.
    pub temp_dir: PathBuf,
    /// Leftover files older than this are swept at startup.
    pub stale_after_seconds: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir().join("cad-engine"),
            stale_after_seconds: 3600,
        }
    }
}

/// Tessellation tolerances handed to the kernel. Process-wide.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MeshConfig {
    /// Maximum chordal deviation between surface and mesh, in model units.
    #[validate(range(exclusive_min = 0.0))]
    pub linear_deflection: f64,
    /// Maximum angle between adjacent facet normals, in radians.
    #[validate(range(exclusive_min = 0.0))]
    pub angular_deflection: f64,
    /// Emit ASCII STL instead of binary.
    pub ascii: bool,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            linear_deflection: 0.1,
            angular_deflection: 0.5,
            ascii: false,
        }
    }
}

/// External geometry kernel invocation.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct KernelConfig {
    /// Engine name reported in response headers and status endpoints.
    #[validate(length(min = 1))]
    pub engine_name: String,
    /// Kernel executable, either a path or a name resolved through `PATH`.
    #[validate(length(min = 1))]
    pub command: String,
    /// Argument template. Placeholders: `{input}`, `{output}`,
    /// `{linear_deflection}`, `{angular_deflection}`, `{format}`.
    pub args: Vec<String>,
    /// Timeout for a single kernel invocation.
    #[validate(range(min = 1))]
    pub timeout_seconds: u64,
    /// Kernel processes allowed to run at once.
    #[validate(range(min = 1))]
    pub max_concurrent_conversions: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            engine_name: "OpenCascade".to_string(),
            command: "occt-step2stl".to_string(),
            args: [
                "--input",
                "{input}",
                "--output",
                "{output}",
                "--linear-deflection",
                "{linear_deflection}",
                "--angular-deflection",
                "{angular_deflection}",
                "--format",
                "{format}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            timeout_seconds: 300,
            max_concurrent_conversions: 4,
        }
    }
}

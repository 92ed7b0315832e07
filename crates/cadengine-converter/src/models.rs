//! Domain models: mesh settings, output format, and the per-request job.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use cadengine_core::config::MeshConfig;

use crate::formats::declared_basename;

/// Tessellation tolerances passed to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeshSettings {
    /// Maximum chordal deviation, in model units.
    pub linear_deflection: f64,
    /// Maximum angular deviation, in radians.
    pub angular_deflection: f64,
}

impl MeshSettings {
    /// Value for the `X-Mesh-Quality` response header.
    pub fn quality_header(&self) -> String {
        format!(
            "linear={},angular={}",
            self.linear_deflection, self.angular_deflection
        )
    }
}

impl From<&MeshConfig> for MeshSettings {
    fn from(config: &MeshConfig) -> Self {
        Self {
            linear_deflection: config.linear_deflection,
            angular_deflection: config.angular_deflection,
        }
    }
}

/// STL encoding requested from the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StlFormat {
    /// 80-byte header + little-endian triangle records.
    Binary,
    /// `solid ... endsolid` text.
    Ascii,
}

impl StlFormat {
    /// Value substituted for the `{format}` kernel placeholder.
    pub fn as_str(&self) -> &'static str {
        match self {
            StlFormat::Binary => "binary",
            StlFormat::Ascii => "ascii",
        }
    }
}

impl From<&MeshConfig> for StlFormat {
    fn from(config: &MeshConfig) -> Self {
        if config.ascii {
            StlFormat::Ascii
        } else {
            StlFormat::Binary
        }
    }
}

/// One kernel invocation. Both paths belong to the request's temp scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionJob {
    /// Validated input artifact.
    pub input_path: PathBuf,
    /// Where the kernel must write the STL.
    pub output_path: PathBuf,
    /// Tessellation tolerances.
    pub mesh: MeshSettings,
    /// Output encoding.
    pub format: StlFormat,
}

/// Download name for a converted file: the original stem with `.stl`.
pub fn stl_filename(original: &str) -> String {
    let base = declared_basename(original);
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    };
    if stem.trim().is_empty() {
        "converted.stl".to_string()
    } else {
        format!("{stem}.stl")
    }
}

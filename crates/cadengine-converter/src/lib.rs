//! # cadengine-converter
//!
//! The request-scoped conversion pipeline of the CAD Engine: an uploaded
//! STEP/IGES artifact is persisted to a scoped temp file, validated by size,
//! extension and header signature, handed to an external geometry kernel,
//! and returned as an STL artifact whose temp files are released when the
//! caller is done with it.
//!
//! The geometry kernel itself is external. [`ProcessKernel`] runs it as a
//! child process so that a kernel crash cannot take the service down.

pub mod error;
pub mod formats;
pub mod kernel;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod temp;
pub mod validator;

pub use error::{PipelineError, Stage};
pub use formats::{CadFormat, FormatFamily};
pub use kernel::{ConversionKernel, KernelError, ProcessKernel};
pub use metrics::{ConversionMetrics, MetricsSnapshot};
pub use models::{ConversionJob, MeshSettings, StlFormat};
pub use pipeline::{ConversionPipeline, ConvertedArtifact};
pub use temp::{TempScope, TempStorage};
pub use validator::{ArtifactValidator, ValidatedArtifact, ValidationError};

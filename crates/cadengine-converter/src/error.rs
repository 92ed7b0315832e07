//! Pipeline failure taxonomy.
//!
//! Every exit from [`crate::ConversionPipeline::run`] other than success is
//! a [`PipelineError`]: a validation rejection, a kernel conversion failure,
//! or an internal fault tagged with the last stage the request reached.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use cadengine_core::error::{AppError, ErrorKind};

use crate::kernel::KernelError;
use crate::validator::ValidationError;

/// Client-facing message for internal failures; detail stays in the logs.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error during conversion";

/// Lifecycle stages of a conversion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Upload accepted by the transport, nothing on disk yet.
    Received,
    /// Upload bytes written to the input temp file.
    Persisted,
    /// Input passed size, extension, and signature checks.
    Validated,
    /// Kernel produced a non-empty output file.
    Converted,
    /// Output handed to the transport.
    Responded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Persisted => "persisted",
            Stage::Validated => "validated",
            Stage::Converted => "converted",
            Stage::Responded => "responded",
        };
        f.write_str(name)
    }
}

/// Terminal failure of a conversion request.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The artifact was rejected before reaching the kernel.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The kernel could not convert a validated artifact.
    #[error("Conversion failed: {reason}")]
    Conversion {
        /// Sanitized kernel diagnostic.
        reason: String,
    },

    /// Anything unanticipated: I/O faults, missing kernel, closed semaphore.
    #[error("Internal failure after stage '{stage}': {message}")]
    Internal {
        /// Last stage the request successfully reached.
        stage: Stage,
        /// Server-side detail, never sent to the client.
        message: String,
        /// Underlying cause.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PipelineError {
    /// Internal failure without an underlying cause.
    pub fn internal(stage: Stage, message: impl Into<String>) -> Self {
        Self::Internal {
            stage,
            message: message.into(),
            source: None,
        }
    }

    /// Internal failure caused by an I/O error.
    pub fn io(stage: Stage, context: &str, err: std::io::Error) -> Self {
        Self::Internal {
            stage,
            message: format!("{context}: {err}"),
            source: Some(Box::new(err)),
        }
    }

    /// Map a kernel error raised while converting a validated artifact.
    pub fn from_kernel(err: KernelError) -> Self {
        match err {
            KernelError::Rejected { reason } => Self::Conversion { reason },
            other => Self::Internal {
                stage: Stage::Validated,
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }

    /// Failure category: `validation`, `conversion`, or `internal`.
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation",
            PipelineError::Conversion { .. } => "conversion",
            PipelineError::Internal { .. } => "internal",
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(e) => AppError::validation(e.to_string()).with_details(
                serde_json::json!({ "stage": "validation", "kind": e.kind() }),
            ),
            PipelineError::Conversion { reason } => {
                AppError::conversion(format!("Conversion failed: {reason}"))
                    .with_details(serde_json::json!({ "stage": "conversion" }))
            }
            err @ PipelineError::Internal { .. } => {
                AppError::with_source(ErrorKind::Internal, INTERNAL_ERROR_MESSAGE, err)
            }
        }
    }
}

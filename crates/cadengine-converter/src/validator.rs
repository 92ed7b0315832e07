//! Artifact validation against the persisted file.
//!
//! The checks run on the bytes on disk, which are the bytes the kernel
//! will read: size from file metadata, extension from the declared name,
//! and the header signature from the first [`SNIFF_LEN`] bytes.

use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncReadExt;

use crate::error::{PipelineError, Stage};
use crate::formats::{self, CadFormat};

/// Number of leading bytes inspected for the header signature.
pub const SNIFF_LEN: usize = 512;

/// Reasons an upload is refused before it reaches the kernel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// File is larger than the configured maximum.
    #[error("File size {size} bytes exceeds maximum allowed size of {limit} bytes")]
    SizeExceeded {
        /// Bytes observed (may stop counting at the first byte over the limit).
        size: u64,
        /// Configured maximum.
        limit: u64,
    },

    /// Upload contained no bytes.
    #[error("Uploaded file is empty")]
    EmptyFile,

    /// Declared extension is not an accepted CAD format.
    #[error(
        "Unsupported file extension '{extension}'. Allowed extensions: {}",
        CadFormat::SUPPORTED_EXTENSIONS.join(", ")
    )]
    UnsupportedExtension {
        /// Extension as declared (lowercased), empty when missing.
        extension: String,
    },

    /// Content does not carry the signature of the declared format.
    #[error("File content does not match the {expected} format (detected: {detected})")]
    ContentTypeMismatch {
        /// Family implied by the extension.
        expected: String,
        /// What the header looks like instead.
        detected: String,
    },

    /// The multipart body could not be read.
    #[error("Malformed upload: {reason}")]
    MalformedUpload {
        /// Transport-level diagnostic.
        reason: String,
    },

    /// The multipart body carried no `file` field.
    #[error("No file uploaded; expected multipart field 'file'")]
    MissingFile,
}

impl ValidationError {
    /// Machine-readable kind used in error details.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::SizeExceeded { .. } => "size_exceeded",
            ValidationError::EmptyFile => "empty_file",
            ValidationError::UnsupportedExtension { .. } => "unsupported_extension",
            ValidationError::ContentTypeMismatch { .. } => "content_type_mismatch",
            ValidationError::MalformedUpload { .. } => "malformed_upload",
            ValidationError::MissingFile => "missing_file",
        }
    }
}

/// An accepted artifact. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedArtifact {
    /// Lowercased extension resolved from the declared name.
    pub extension: String,
    /// Format the extension maps to.
    pub format: CadFormat,
    /// Size on disk.
    pub size: u64,
}

/// Size, extension, and signature checks for persisted uploads.
#[derive(Debug, Clone)]
pub struct ArtifactValidator {
    /// Maximum accepted size in bytes.
    max_bytes: u64,
}

impl ArtifactValidator {
    /// Create a validator with the given size ceiling.
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    /// Configured size ceiling.
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Validate the persisted file at `path` against its declared name.
    ///
    /// I/O failures reading the file are internal errors, not rejections.
    pub async fn validate(
        &self,
        path: &Path,
        declared_filename: &str,
    ) -> Result<ValidatedArtifact, PipelineError> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| PipelineError::io(Stage::Persisted, "Failed to stat upload", e))?
            .len();

        let header = read_header(path)
            .await
            .map_err(|e| PipelineError::io(Stage::Persisted, "Failed to read upload header", e))?;

        Ok(self.check(size, declared_filename, &header)?)
    }

    /// Pure check over already-gathered facts about the file.
    pub fn check(
        &self,
        size: u64,
        declared_filename: &str,
        header: &[u8],
    ) -> Result<ValidatedArtifact, ValidationError> {
        if size > self.max_bytes {
            return Err(ValidationError::SizeExceeded {
                size,
                limit: self.max_bytes,
            });
        }
        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }

        let extension = formats::declared_extension(declared_filename).unwrap_or_default();
        let format = CadFormat::from_extension(&extension).ok_or_else(|| {
            ValidationError::UnsupportedExtension {
                extension: extension.clone(),
            }
        })?;

        let family = format.family();
        if !family.matches_header(header) {
            return Err(ValidationError::ContentTypeMismatch {
                expected: family.label().to_string(),
                detected: formats::describe_header(header),
            });
        }

        Ok(ValidatedArtifact {
            extension,
            format,
            size,
        })
    }
}

async fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut header = Vec::with_capacity(SNIFF_LEN);
    let mut limited = (&mut file).take(SNIFF_LEN as u64);
    limited.read_to_end(&mut header).await?;
    Ok(header)
}

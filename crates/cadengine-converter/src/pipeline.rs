//! Request lifecycle: receive, persist, validate, convert, respond.
//!
//! [`ConversionPipeline::run`] drives one upload through every stage and
//! either returns a [`ConvertedArtifact`] (which owns the request's temp
//! files until the caller releases or drops it) or a [`PipelineError`]
//! after the temp files have already been removed.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use cadengine_core::config::AppConfig;

use crate::error::{PipelineError, Stage};
use crate::formats::{self, CadFormat};
use crate::kernel::ConversionKernel;
use crate::metrics::ConversionMetrics;
use crate::models::{self, ConversionJob, MeshSettings, StlFormat};
use crate::temp::{TempScope, TempStorage};
use crate::validator::{ArtifactValidator, ValidatedArtifact, ValidationError};

/// Shared conversion pipeline. One per process.
#[derive(Debug)]
pub struct ConversionPipeline {
    storage: TempStorage,
    validator: ArtifactValidator,
    kernel: Arc<dyn ConversionKernel>,
    mesh: MeshSettings,
    format: StlFormat,
    slots: Arc<Semaphore>,
    max_slots: usize,
    metrics: Arc<ConversionMetrics>,
}

/// Successful conversion. Owns the request's temp files.
#[derive(Debug)]
pub struct ConvertedArtifact {
    /// Client-declared name, directory components stripped.
    pub original_filename: String,
    /// Download name: original stem with `.stl`.
    pub stl_filename: String,
    /// STL written by the kernel.
    pub output_path: PathBuf,
    /// STL size in bytes.
    pub output_size: u64,
    /// The accepted input.
    pub input: ValidatedArtifact,
    /// Engine that produced the STL.
    pub engine: String,
    /// Tolerances used.
    pub mesh: MeshSettings,
    /// STL encoding.
    pub format: StlFormat,
    scope: TempScope,
}

impl ConvertedArtifact {
    /// Read the whole STL into memory.
    pub async fn read_output(&self) -> Result<Vec<u8>, PipelineError> {
        tokio::fs::read(&self.output_path)
            .await
            .map_err(|e| PipelineError::io(Stage::Converted, "Failed to read STL output", e))
    }

    /// Open the STL for streaming.
    pub async fn open_output(&self) -> Result<tokio::fs::File, PipelineError> {
        tokio::fs::File::open(&self.output_path)
            .await
            .map_err(|e| PipelineError::io(Stage::Converted, "Failed to open STL output", e))
    }

    /// Give up the artifact, keeping only the guard over its temp files.
    pub fn into_scope(self) -> TempScope {
        self.scope
    }

    /// Remove the request's temp files now.
    pub async fn release(self) {
        self.scope.release().await;
    }
}

impl ConversionPipeline {
    /// Build the pipeline around an opened temp root and a kernel.
    pub fn new(storage: TempStorage, kernel: Arc<dyn ConversionKernel>, config: &AppConfig) -> Self {
        let max_slots = config.kernel.max_concurrent_conversions.max(1);
        Self {
            storage,
            validator: ArtifactValidator::new(config.limits.max_upload_bytes),
            kernel,
            mesh: MeshSettings::from(&config.mesh),
            format: StlFormat::from(&config.mesh),
            slots: Arc::new(Semaphore::new(max_slots)),
            max_slots,
            metrics: Arc::new(ConversionMetrics::new()),
        }
    }

    /// Conversion statistics.
    pub fn metrics(&self) -> &Arc<ConversionMetrics> {
        &self.metrics
    }

    /// The geometry kernel.
    pub fn kernel(&self) -> &Arc<dyn ConversionKernel> {
        &self.kernel
    }

    /// Temp storage backing request files.
    pub fn storage(&self) -> &TempStorage {
        &self.storage
    }

    /// Tessellation tolerances.
    pub fn mesh(&self) -> MeshSettings {
        self.mesh
    }

    /// STL encoding.
    pub fn format(&self) -> StlFormat {
        self.format
    }

    /// Maximum accepted upload size.
    pub fn max_upload_bytes(&self) -> u64 {
        self.validator.max_bytes()
    }

    /// Kernel slots not currently in use.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Total kernel slots.
    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    /// Convert one upload.
    ///
    /// `upload` yields the raw bytes of the file part; a stream error is
    /// treated as a malformed upload. The kernel is invoked at most once,
    /// and only after validation has passed.
    pub async fn run<S, E>(
        &self,
        declared_filename: &str,
        upload: S,
    ) -> Result<ConvertedArtifact, PipelineError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let start = Instant::now();
        let original_filename = formats::declared_basename(declared_filename).to_string();
        self.metrics.record_started();

        let mut scope = self.storage.scope();
        match self.execute(&mut scope, &original_filename, upload).await {
            Ok((input, output_path, output_size)) => {
                let elapsed = start.elapsed();
                self.metrics
                    .record_success(elapsed, input.size, output_size);
                info!(
                    file = %original_filename,
                    input_bytes = input.size,
                    output_bytes = output_size,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Conversion succeeded"
                );
                Ok(ConvertedArtifact {
                    stl_filename: models::stl_filename(&original_filename),
                    original_filename,
                    output_path,
                    output_size,
                    input,
                    engine: self.kernel.name().to_string(),
                    mesh: self.mesh,
                    format: self.format,
                    scope,
                })
            }
            Err(err) => {
                self.metrics.record_failure(&err);
                match &err {
                    PipelineError::Validation(e) => {
                        warn!(file = %original_filename, kind = e.kind(), "Upload rejected: {e}")
                    }
                    PipelineError::Conversion { reason } => {
                        warn!(file = %original_filename, "Conversion failed: {reason}")
                    }
                    PipelineError::Internal { stage, .. } => {
                        error!(file = %original_filename, %stage, error = %err, "Conversion aborted")
                    }
                }
                scope.release().await;
                Err(err)
            }
        }
    }

    async fn execute<S, E>(
        &self,
        scope: &mut TempScope,
        filename: &str,
        upload: S,
    ) -> Result<(ValidatedArtifact, PathBuf, u64), PipelineError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        // Received -> Persisted
        let input_path = scope.allocate(&input_suffix(filename));
        let written = self.persist(&input_path, upload).await?;
        debug!(path = %input_path.display(), written, "Upload persisted");

        // Persisted -> Validated
        let input = self.validator.validate(&input_path, filename).await?;

        // Validated -> Converted
        let output_path = scope.allocate(".stl");
        let job = ConversionJob {
            input_path,
            output_path: output_path.clone(),
            mesh: self.mesh,
            format: self.format,
        };
        {
            let _permit = self.slots.acquire().await.map_err(|_| {
                PipelineError::internal(Stage::Validated, "Conversion slots closed")
            })?;
            self.kernel
                .convert(&job)
                .await
                .map_err(PipelineError::from_kernel)?;
        }

        let output_size = match tokio::fs::metadata(&output_path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PipelineError::Conversion {
                    reason: "kernel produced no output".to_string(),
                });
            }
            Err(e) => {
                return Err(PipelineError::io(
                    Stage::Validated,
                    "Failed to stat STL output",
                    e,
                ));
            }
        };
        if output_size == 0 {
            return Err(PipelineError::Conversion {
                reason: "kernel produced an empty STL file".to_string(),
            });
        }

        Ok((input, output_path, output_size))
    }

    /// Stream the upload to `path`, refusing to write past the size limit.
    async fn persist<S, E>(&self, path: &Path, upload: S) -> Result<u64, PipelineError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let limit = self.validator.max_bytes();
        let mut upload = std::pin::pin!(upload);
        // The file must exist before the first await point.
        let file = std::fs::File::create(path)
            .map_err(|e| PipelineError::io(Stage::Received, "Failed to create input file", e))?;
        let mut file = tokio::fs::File::from_std(file);

        let mut written: u64 = 0;
        while let Some(chunk) = upload.next().await {
            let chunk = chunk.map_err(|e| ValidationError::MalformedUpload {
                reason: e.to_string(),
            })?;
            written += chunk.len() as u64;
            if written > limit {
                return Err(ValidationError::SizeExceeded {
                    size: written,
                    limit,
                }
                .into());
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| PipelineError::io(Stage::Received, "Failed to write upload", e))?;
        }
        file.flush()
            .await
            .map_err(|e| PipelineError::io(Stage::Received, "Failed to flush upload", e))?;

        Ok(written)
    }
}

/// Temp suffix for the input file. Unsupported names get a neutral suffix.
fn input_suffix(filename: &str) -> String {
    formats::declared_extension(filename)
        .filter(|ext| CadFormat::from_extension(ext).is_some())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_else(|| ".upload".to_string())
}

//! Geometry kernel boundary.
//!
//! The pipeline talks to the kernel through [`ConversionKernel`]. The
//! production adapter, [`ProcessKernel`], runs an external tessellation
//! tool as a child process so a kernel crash or hang costs one request,
//! never the service.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use cadengine_core::config::KernelConfig;

use crate::models::ConversionJob;

/// Longest kernel diagnostic passed on to clients.
const MAX_REASON_CHARS: usize = 300;

/// Errors raised by a kernel adapter.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The kernel ran but could not convert this input: bad geometry,
    /// timeout, or the process died.
    #[error("{reason}")]
    Rejected {
        /// Sanitized diagnostic.
        reason: String,
    },

    /// The kernel cannot be invoked at all.
    #[error("Geometry kernel unavailable: {reason}")]
    Unavailable {
        /// Why the kernel could not be started.
        reason: String,
    },

    /// I/O failure talking to the kernel process.
    #[error("Kernel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A geometry kernel able to tessellate one CAD file into STL.
#[async_trait]
pub trait ConversionKernel: Send + Sync + Debug {
    /// Engine name reported to clients.
    fn name(&self) -> &str;

    /// Whether the kernel can currently be invoked.
    async fn is_available(&self) -> bool {
        true
    }

    /// Read `job.input_path` and write an STL to `job.output_path`.
    async fn convert(&self, job: &ConversionJob) -> Result<(), KernelError>;
}

/// Kernel adapter that runs an external command per conversion.
#[derive(Debug, Clone)]
pub struct ProcessKernel {
    engine_name: String,
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessKernel {
    /// Create an adapter for `command` with an argument template.
    pub fn new(
        engine_name: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            engine_name: engine_name.into(),
            command: command.into(),
            args,
            timeout,
        }
    }

    /// Build the adapter from the `[kernel]` config section.
    pub fn from_config(config: &KernelConfig) -> Self {
        Self::new(
            config.engine_name.clone(),
            config.command.clone(),
            config.args.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
    }

    /// Expand placeholders in the argument template for one job.
    pub fn substitute_args(&self, job: &ConversionJob) -> Vec<String> {
        let input = job.input_path.to_string_lossy();
        let output = job.output_path.to_string_lossy();
        let linear = job.mesh.linear_deflection.to_string();
        let angular = job.mesh.angular_deflection.to_string();

        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input)
                    .replace("{output}", &output)
                    .replace("{linear_deflection}", &linear)
                    .replace("{angular_deflection}", &angular)
                    .replace("{format}", job.format.as_str())
            })
            .collect()
    }

    async fn resolve_command(&self) -> Option<PathBuf> {
        let command = Path::new(&self.command);
        if command.components().count() > 1 {
            return is_file(command).await.then(|| command.to_path_buf());
        }
        let path = std::env::var_os("PATH")?;
        for candidate in std::env::split_paths(&path).map(|dir| dir.join(command)) {
            if is_file(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file())
}

#[async_trait]
impl ConversionKernel for ProcessKernel {
    fn name(&self) -> &str {
        &self.engine_name
    }

    async fn is_available(&self) -> bool {
        self.resolve_command().await.is_some()
    }

    async fn convert(&self, job: &ConversionJob) -> Result<(), KernelError> {
        let args = self.substitute_args(job);
        let start = Instant::now();

        debug!(command = %self.command, ?args, "Spawning geometry kernel");

        let child = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    KernelError::Unavailable {
                        reason: format!("cannot start '{}': {e}", self.command),
                    }
                }
                _ => KernelError::Io(e),
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    command = %self.command,
                    timeout_secs = self.timeout.as_secs(),
                    "Geometry kernel timed out"
                );
                return Err(KernelError::Rejected {
                    reason: format!(
                        "kernel timed out after {} seconds",
                        self.timeout.as_secs()
                    ),
                });
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;

        if output.status.success() {
            info!(engine = %self.engine_name, elapsed_ms, "Geometry kernel finished");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        match output.status.code() {
            Some(code) => {
                warn!(code, elapsed_ms, stderr = %stderr.trim(), "Geometry kernel failed");
                let detail = sanitize_diagnostic(&stderr, job);
                let reason = if detail.is_empty() {
                    format!("kernel exited with code {code}")
                } else {
                    detail
                };
                Err(KernelError::Rejected { reason })
            }
            None => {
                warn!(elapsed_ms, status = %output.status, "Geometry kernel crashed");
                Err(KernelError::Rejected {
                    reason: "kernel process crashed".to_string(),
                })
            }
        }
    }
}

/// Strip temp paths from kernel output and bound its length.
fn sanitize_diagnostic(raw: &str, job: &ConversionJob) -> String {
    let mut text = raw.trim().to_string();
    let replacements = [
        (job.input_path.to_string_lossy().into_owned(), "<input>"),
        (job.output_path.to_string_lossy().into_owned(), "<output>"),
    ];
    for (path, label) in &replacements {
        if !path.is_empty() {
            text = text.replace(path.as_str(), label);
        }
    }
    if let Some(dir) = job.input_path.parent() {
        let dir = dir.to_string_lossy();
        if !dir.is_empty() {
            text = text.replace(dir.as_ref(), "<tmp>");
        }
    }

    let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.chars().count() > MAX_REASON_CHARS {
        let mut cut: String = line.chars().take(MAX_REASON_CHARS).collect();
        cut.push_str("...");
        cut
    } else {
        line
    }
}

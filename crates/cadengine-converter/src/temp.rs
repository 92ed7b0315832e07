//! Scoped temp storage for request artifacts.
//!
//! [`TempStorage`] hands out unique paths under one root directory.
//! [`TempScope`] ties every path allocated for a request to the request's
//! lifetime: paths are removed by [`TempScope::release`] or, failing that,
//! when the scope is dropped (early return, panic, cancelled future).

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};
use uuid::Uuid;

/// File name prefix for everything this service writes to the temp root.
pub const TEMP_PREFIX: &str = "cad__";

/// Allocator and janitor for the temp root directory.
#[derive(Debug, Clone)]
pub struct TempStorage {
    /// Directory holding all request files.
    root: PathBuf,
}

impl TempStorage {
    /// Open (and create if needed) the temp root.
    pub async fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// The temp root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a unique path `<root>/cad__<uuid-v7><suffix>`.
    ///
    /// Nothing is created on disk; the caller owns the path.
    pub fn allocate(&self, suffix: &str) -> PathBuf {
        let name = format!("{TEMP_PREFIX}{}{suffix}", Uuid::now_v7().simple());
        self.root.join(name)
    }

    /// Best-effort removal of `paths`. Never fails; a missing file is fine.
    pub async fn release(&self, paths: &[PathBuf]) {
        for path in paths {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "Released temp file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Temp file cleanup failed"),
            }
        }
    }

    /// Start a request-lifetime scope.
    pub fn scope(&self) -> TempScope {
        TempScope {
            storage: self.clone(),
            paths: Vec::new(),
        }
    }

    /// Remove files left behind by a previous process that are older than
    /// `max_age`. Returns the number of files removed.
    pub async fn sweep_stale(&self, max_age: Duration) -> io::Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let now = SystemTime::now();
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(TEMP_PREFIX) {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Stale temp file not removed"),
            }
        }

        if removed > 0 {
            info!(removed, root = %self.root.display(), "Swept stale temp files");
        }
        Ok(removed)
    }
}

/// Paths allocated for one request; released exactly once.
#[derive(Debug)]
pub struct TempScope {
    storage: TempStorage,
    paths: Vec<PathBuf>,
}

impl TempScope {
    /// Allocate a path owned by this scope.
    pub fn allocate(&mut self, suffix: &str) -> PathBuf {
        let path = self.storage.allocate(suffix);
        self.paths.push(path.clone());
        path
    }

    /// Paths currently owned by this scope.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Remove all owned paths now.
    pub async fn release(mut self) {
        let paths = std::mem::take(&mut self.paths);
        self.storage.release(&paths).await;
    }
}

impl Drop for TempScope {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "Released temp file on drop"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Temp file cleanup failed"),
            }
        }
    }
}

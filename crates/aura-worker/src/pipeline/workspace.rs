//! Per-job temporary directory and artifact cleanup.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use aura_media::move_file;

use crate::error::WorkerResult;

/// Owns every file a job creates. [`JobWorkspace::cleanup`] removes them all.
///
/// A workspace dropped without `cleanup` (a cancelled job) removes its files
/// synchronously on drop.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: PathBuf,
    artifacts: Vec<PathBuf>,
    cleaned: bool,
}

/// What cleanup managed to delete.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

impl JobWorkspace {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            artifacts: Vec::new(),
            cleaned: false,
        }
    }

    pub async fn create(&self) -> WorkerResult<()> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Register `path` for deletion at cleanup and return it.
    pub fn track(&mut self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        if !self.artifacts.contains(&path) {
            self.artifacts.push(path.clone());
        }
        path
    }

    /// Path inside the workspace, tracked for cleanup.
    pub fn artifact(&mut self, file_name: &str) -> PathBuf {
        let path = self.dir.join(file_name);
        self.track(path)
    }

    /// Move a staged upload into the workspace as `input.<ext>`.
    ///
    /// The staged path stays tracked so a failed move still gets cleaned up.
    pub async fn adopt_input(&mut self, staged: &Path) -> WorkerResult<PathBuf> {
        self.track(staged);
        let file_name = match staged.extension() {
            Some(ext) => format!("input.{}", ext.to_string_lossy()),
            None => "input".to_string(),
        };
        let input = self.artifact(&file_name);
        move_file(staged, &input).await?;
        Ok(input)
    }

    /// Delete every tracked artifact, then the directory itself.
    ///
    /// Failures are logged and reported, never returned as errors.
    pub async fn cleanup(mut self) -> CleanupReport {
        self.cleaned = true;
        let mut report = CleanupReport::default();

        for path in &self.artifacts {
            match fs::remove_file(path).await {
                Ok(()) => report.removed.push(path.clone()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove job artifact");
                    report.failed.push(path.clone());
                }
            }
        }

        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Failed to remove job directory");
                report.failed.push(self.dir.clone());
            }
        }

        debug!(
            dir = %self.dir.display(),
            removed = report.removed.len(),
            failed = report.failed.len(),
            "Job workspace cleaned"
        );
        report
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }
        for path in &self.artifacts {
            let _ = std::fs::remove_file(path);
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => warn!(dir = %self.dir.display(), "Removed workspace of an interrupted job"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %self.dir.display(), error = %e, "Failed to remove interrupted job workspace"),
        }
    }
}

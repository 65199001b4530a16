//! Per-job scratch directories with guaranteed cleanup.

use std::path::{Path, PathBuf};

use crate::record::JobId;

/// Allocates and removes job-scoped scratch storage under a configurable
/// temp root.
///
/// A scratch directory exists only between job admission and finalization.
/// [`cleanup`](TempFileManager::cleanup) is invoked exactly once per job,
/// from the manager's finalization step, on every terminal path; failures
/// are logged and never replace the job's terminal error.
#[derive(Debug, Clone)]
pub struct TempFileManager {
    temp_root: PathBuf,
}

impl TempFileManager {
    pub fn new(temp_root: impl Into<PathBuf>) -> Self {
        Self {
            temp_root: temp_root.into(),
        }
    }

    /// The directory a job's scratch space lives in (it may not exist yet).
    pub fn scratch_path(&self, job_id: JobId) -> PathBuf {
        // The job id is a UUID, so names cannot collide across concurrent
        // jobs or engine instances sharing a temp root.
        self.temp_root.join(format!("remux-job-{job_id}"))
    }

    /// Create the scratch directory for `job_id`.
    pub async fn create_scratch_dir(&self, job_id: JobId) -> std::io::Result<PathBuf> {
        let path = self.scratch_path(job_id);
        tokio::fs::create_dir_all(&path).await?;
        tracing::debug!(job_id = %job_id, path = %path.display(), "Created scratch dir");
        Ok(path)
    }

    /// Remove a job's scratch directory.
    ///
    /// Best-effort: a failure is logged, not returned, so it can never mask
    /// the outcome of the job that owned the directory.
    pub async fn cleanup(&self, job_id: JobId, path: &Path) {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {
                tracing::debug!(job_id = %job_id, path = %path.display(), "Removed scratch dir");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    path = %path.display(),
                    error = %e,
                    "Failed to remove scratch dir",
                );
            }
        }
    }
}

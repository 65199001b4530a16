//! The mutable runtime entity tracking one submitted job.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use remux_core::progress::Progress;
use remux_core::scheduling::JobStatus;

use crate::job::Job;
use crate::process::ResourceUsage;

/// Opaque unique job token.
pub type JobId = Uuid;

/// Why a job ended in a non-`Completed` terminal state.
///
/// Delivered exclusively through [`JobRecord::error`]; runtime failures
/// never cross the executor/manager boundary as panics or return errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize)]
pub enum JobFailure {
    /// The binary could not be spawned (missing, unrunnable) or job setup
    /// failed before spawn. Fatal, non-retryable.
    #[error("failed to spawn process: {0}")]
    Spawn(String),

    /// The process exited non-zero. Whether to retry is the caller's call,
    /// based on the code and the diagnostic tail.
    #[error("process exited with code {exit_code}")]
    Exit {
        exit_code: i32,
        /// The last diagnostic lines the process wrote, newest last.
        diagnostic_tail: Vec<String>,
    },

    /// The wall-clock timeout expired and the process was killed.
    #[error("job timed out and the process was killed")]
    Timeout,

    /// A usage sample exceeded a hard ceiling and the process was killed.
    #[error("resource ceiling exceeded: {} bytes, {} % cpu", .usage.memory_bytes, .usage.cpu_percent)]
    ResourceExceeded { usage: ResourceUsage },

    /// The job was cancelled by the caller or by shutdown.
    #[error("job was cancelled")]
    Cancelled,
}

/// Runtime state of one submitted job.
///
/// Owned exclusively by the job manager; everything handed out via
/// `status()` is a snapshot clone. Mutation goes through
/// [`JobRecord::transition`], which enforces the state machine.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    /// The immutable submission this record tracks.
    pub job: Arc<Job>,
    pub status: JobStatus,
    /// Latest progress snapshot; nothing older is retained.
    pub last_progress: Option<Progress>,
    /// OS process id while `Running`.
    pub pid: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Terminal error for non-`Completed` outcomes.
    pub error: Option<JobFailure>,
}

impl JobRecord {
    pub(crate) fn new(id: JobId, job: Arc<Job>) -> Self {
        Self {
            id,
            job,
            status: JobStatus::Pending,
            last_progress: None,
            pid: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// Move the record to `to`, stamping timestamps.
    ///
    /// Rejects transitions the state machine forbids, so a record can never
    /// regress out of a terminal state.
    pub(crate) fn transition(&mut self, to: JobStatus) -> Result<(), String> {
        self.status.validate_transition(to)?;
        self.status = to;
        match to {
            JobStatus::Running => self.started_at = Some(Utc::now()),
            _ if to.is_terminal() => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;

    fn record() -> JobRecord {
        let job = Job::transcode("/media/in.mp4", "/media/out.mp4");
        JobRecord::new(Uuid::new_v4(), Arc::new(job))
    }

    #[test]
    fn new_record_is_pending() {
        let record = record();
        assert_eq!(record.status, JobStatus::Pending);
        assert!(record.started_at.is_none());
        assert!(record.completed_at.is_none());
        assert!(record.error.is_none());
    }

    #[test]
    fn running_transition_stamps_started_at() {
        let mut record = record();
        record.transition(JobStatus::Running).unwrap();
        assert!(record.started_at.is_some());
        assert!(record.completed_at.is_none());
    }

    #[test]
    fn terminal_transition_stamps_completed_at() {
        let mut record = record();
        record.transition(JobStatus::Running).unwrap();
        record.transition(JobStatus::Completed).unwrap();
        assert!(record.completed_at.is_some());
    }

    #[test]
    fn terminal_state_cannot_regress() {
        let mut record = record();
        record.transition(JobStatus::Cancelled).unwrap();
        assert!(record.transition(JobStatus::Running).is_err());
        assert_eq!(record.status, JobStatus::Cancelled);
    }

    #[test]
    fn pending_cannot_jump_to_completed() {
        let mut record = record();
        assert!(record.transition(JobStatus::Completed).is_err());
        assert_eq!(record.status, JobStatus::Pending);
    }

    #[test]
    fn exit_failure_displays_code() {
        let failure = JobFailure::Exit {
            exit_code: 187,
            diagnostic_tail: vec!["Conversion failed!".into()],
        };
        assert_eq!(failure.to_string(), "process exited with code 187");
    }
}

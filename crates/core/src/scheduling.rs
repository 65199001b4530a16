//! Job lifecycle state machine and priority constants.
//!
//! Lives in `core` (zero internal deps) so the engine, the worker binary,
//! and tests all share one definition of which transitions are legal.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Priority constants
// ---------------------------------------------------------------------------

/// Priority value for urgent jobs. Dispatched before all others when a
/// priority-aware scheduling policy is installed.
pub const PRIORITY_URGENT: i32 = 10;

/// Priority value for normal jobs. Default.
pub const PRIORITY_NORMAL: i32 = 0;

/// Priority value for background jobs. Dispatched last.
pub const PRIORITY_BACKGROUND: i32 = -10;

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Lifecycle state of a submitted job.
///
/// `Pending → Running → {Completed, Failed, TimedOut, Cancelled}`, with the
/// extra direct edge `Pending → Cancelled` (dequeued before a process ever
/// spawned). The four right-hand states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting for a concurrency slot and governor admission.
    Pending,
    /// A process is live for this job.
    Running,
    /// The process exited with code 0.
    Completed,
    /// The process failed to spawn, exited non-zero, or hit a resource ceiling.
    Failed,
    /// The wall-clock timeout expired and the process was killed.
    TimedOut,
    /// Explicitly cancelled by the caller (or by shutdown).
    Cancelled,
}

impl JobStatus {
    /// Whether this status is terminal (no outgoing transitions).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }

    /// The set of statuses reachable from `self`.
    ///
    /// Terminal states return an empty slice.
    pub fn valid_transitions(self) -> &'static [JobStatus] {
        match self {
            Self::Pending => &[Self::Running, Self::Cancelled],
            Self::Running => &[
                Self::Completed,
                Self::Failed,
                Self::TimedOut,
                Self::Cancelled,
            ],
            Self::Completed | Self::Failed | Self::TimedOut | Self::Cancelled => &[],
        }
    }

    /// Check whether a transition from `self` to `to` is legal.
    pub fn can_transition(self, to: JobStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// Validate a transition, returning a descriptive message for illegal ones.
    pub fn validate_transition(self, to: JobStatus) -> Result<(), String> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(format!("Invalid transition: {self} -> {to}"))
        }
    }

    /// Stable lowercase name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

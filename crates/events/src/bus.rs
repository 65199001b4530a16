//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`JobEvent`]s. It is shared
//! as `Arc<EventBus>` between the job manager (publisher) and any number of
//! observers (progress UIs, log forwarders, tests).

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use remux_core::progress::Progress;

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// What happened to a job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum JobEventKind {
    /// The job was accepted by `submit` (queued or dispatched).
    Submitted,
    /// The job left the queue and a worker task took it over.
    Dispatched,
    /// The running process reported progress.
    Progress { progress: Progress },
    /// The process exited with code 0.
    Completed,
    /// The job failed (spawn error, non-zero exit, resource kill).
    Failed { error: String },
    /// The job's wall-clock timeout expired.
    TimedOut,
    /// The job was cancelled.
    Cancelled,
}

/// A job lifecycle event with its subject and emission time.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    /// The job this event belongs to.
    pub job_id: Uuid,
    /// When the event was published (UTC).
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: JobEventKind,
}

impl JobEvent {
    /// Create an event stamped with the current time.
    pub fn new(job_id: Uuid, kind: JobEventKind) -> Self {
        Self {
            job_id,
            timestamp: Utc::now(),
            kind,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Backpressure policy is drop-oldest: when the buffer is full the oldest
/// un-consumed events are discarded and a slow receiver observes
/// `RecvError::Lagged`. Publishing never blocks, so a stalled subscriber can
/// never stall process I/O.
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: JobEvent) {
        // Ignore the SendError — it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Errors returned synchronously by the submission surface.
//!
//! Runtime failures (spawn errors, non-zero exits, timeouts, resource kills)
//! never surface here — they are delivered exclusively through the job's
//! terminal [`crate::record::JobFailure`].

use remux_core::ValidationError;

/// Why a `submit` call was rejected.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubmitError {
    /// The job specification failed validation. Non-retryable; nothing was
    /// queued and no slot was consumed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The queue is at capacity. Backpressure signal — retry later.
    #[error("job queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// Shutdown has begun; no new jobs are admitted.
    #[error("engine is shutting down")]
    ShuttingDown,
}

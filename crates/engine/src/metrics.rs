//! Well-known metric name constants and the observability seam.
//!
//! The engine emits counters, gauges, and histogram observations at
//! well-defined lifecycle points through [`MetricsSink`]. What happens to
//! them — Prometheus, StatsD, logs — is the embedding application's concern.

/// Counter: jobs accepted by `submit`.
pub const METRIC_JOBS_SUBMITTED: &str = "jobs_submitted_total";

/// Counter: jobs handed to a worker slot.
pub const METRIC_JOBS_DISPATCHED: &str = "jobs_dispatched_total";

/// Counter: jobs that completed successfully.
pub const METRIC_JOBS_COMPLETED: &str = "jobs_completed_total";

/// Counter: jobs that failed (spawn error, non-zero exit).
pub const METRIC_JOBS_FAILED: &str = "jobs_failed_total";

/// Counter: jobs killed by the wall-clock timeout.
pub const METRIC_JOBS_TIMED_OUT: &str = "jobs_timed_out_total";

/// Counter: jobs cancelled by the caller or by shutdown.
pub const METRIC_JOBS_CANCELLED: &str = "jobs_cancelled_total";

/// Counter: jobs killed for exceeding a hard resource ceiling.
pub const METRIC_JOBS_RESOURCE_KILLED: &str = "jobs_resource_killed_total";

/// Gauge: jobs currently running.
pub const METRIC_JOBS_ACTIVE: &str = "jobs_active";

/// Gauge: jobs currently waiting in the queue.
pub const METRIC_QUEUE_DEPTH: &str = "queue_depth";

/// Histogram: seconds from dispatch to terminal state.
pub const METRIC_JOB_DURATION_SECONDS: &str = "job_duration_seconds";

/// Histogram: seconds from submission to dispatch.
pub const METRIC_QUEUE_WAIT_SECONDS: &str = "queue_wait_seconds";

/// Destination for engine metrics, injected into the manager.
pub trait MetricsSink: Send + Sync {
    /// Increment a named counter by one.
    fn incr_counter(&self, name: &'static str);

    /// Set a named gauge to an absolute value.
    fn set_gauge(&self, name: &'static str, value: f64);

    /// Record one observation of a named histogram.
    fn observe(&self, name: &'static str, value: f64);
}

/// Sink that discards everything. The default when none is injected.
#[derive(Debug, Default, Clone)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn incr_counter(&self, _name: &'static str) {}
    fn set_gauge(&self, _name: &'static str, _value: f64) {}
    fn observe(&self, _name: &'static str, _value: f64) {}
}

//! Top-level job orchestrator.
//!
//! [`JobManager`] owns the bounded FIFO queue, the concurrency slots, the
//! record map, and every lifecycle transition. One `Mutex` around
//! [`ManagerState`] is the only shared mutable state; dispatch and
//! completion each run under a single lock acquisition, and the lock is
//! never held across an await — the only genuine suspension point is the
//! worker task awaiting its own process.
//!
//! Construction is explicit dependency injection: there is no global
//! registry, so independent managers coexist freely (the tests rely on it).

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use remux_core::command::Command;
use remux_core::scheduling::JobStatus;
use remux_events::{EventBus, JobEvent, JobEventKind};

use crate::config::EngineConfig;
use crate::error::SubmitError;
use crate::executor::{ExecutionOutcome, ProcessExecutor, ProcessRegistry};
use crate::governor::ResourceGovernor;
use crate::job::{Job, ResourceEstimate};
use crate::metrics::{self, MetricsSink, NoopMetrics};
use crate::probe::{FfprobeProber, MediaProbe};
use crate::process::{OsProcessRunner, ProcessRunner};
use crate::record::{JobFailure, JobId, JobRecord};
use crate::scratch::TempFileManager;
use crate::tracker::ProgressTracker;

// ---------------------------------------------------------------------------
// Scheduling policy
// ---------------------------------------------------------------------------

/// A job waiting for a slot.
#[derive(Debug)]
pub struct QueuedJob {
    pub id: JobId,
    pub priority: i32,
    pub estimate: ResourceEstimate,
    pub(crate) command: Command,
}

/// Chooses which queued job to dispatch next.
///
/// `admit` answers whether the governor would accept an estimate right now.
/// Returning `None` holds the whole queue until the next completion.
pub trait SchedulingPolicy: Send + Sync {
    fn select_next(
        &self,
        queue: &VecDeque<QueuedJob>,
        admit: &dyn Fn(&ResourceEstimate) -> bool,
    ) -> Option<usize>;
}

/// Strict arrival order. When the governor defers the queue head, the head
/// is held — later jobs do not jump it.
#[derive(Debug, Default, Clone)]
pub struct FifoHold;

impl SchedulingPolicy for FifoHold {
    fn select_next(
        &self,
        queue: &VecDeque<QueuedJob>,
        admit: &dyn Fn(&ResourceEstimate) -> bool,
    ) -> Option<usize> {
        let head = queue.front()?;
        admit(&head.estimate).then_some(0)
    }
}

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

/// Injected collaborators for a [`JobManager`].
pub struct EngineDeps {
    pub runner: Arc<dyn ProcessRunner>,
    pub probe: Arc<dyn MediaProbe>,
    pub bus: Arc<EventBus>,
    pub metrics: Arc<dyn MetricsSink>,
    pub policy: Arc<dyn SchedulingPolicy>,
}

impl EngineDeps {
    /// Native collaborators: real processes, real `ffprobe`, no-op metrics.
    pub fn native(config: &EngineConfig) -> Self {
        Self {
            runner: Arc::new(OsProcessRunner),
            probe: Arc::new(FfprobeProber::new(&config.ffprobe_path)),
            bus: Arc::new(EventBus::default()),
            metrics: Arc::new(NoopMetrics),
            policy: Arc::new(FifoHold),
        }
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Mutable shared state. Guarded by one mutex; never locked across an await.
struct ManagerState {
    records: HashMap<JobId, JobRecord>,
    queue: VecDeque<QueuedJob>,
    active: usize,
    draining: bool,
    /// Per-job cancellation tokens (children of the master token).
    cancels: HashMap<JobId, CancellationToken>,
    /// Worker task handles, awaited during shutdown.
    tasks: HashMap<JobId, JoinHandle<()>>,
}

/// The job orchestrator. Create with [`JobManager::start`] and share the
/// returned `Arc`.
pub struct JobManager {
    config: EngineConfig,
    state: Mutex<ManagerState>,
    governor: ResourceGovernor,
    executor: ProcessExecutor,
    scratch: TempFileManager,
    probe: Arc<dyn MediaProbe>,
    bus: Arc<EventBus>,
    metrics: Arc<dyn MetricsSink>,
    policy: Arc<dyn SchedulingPolicy>,
    /// Master cancellation token -- cancelled during shutdown.
    shutdown_token: CancellationToken,
}

impl JobManager {
    /// Create a manager with native collaborators.
    pub fn start(config: EngineConfig) -> Arc<Self> {
        let deps = EngineDeps::native(&config);
        Self::with_deps(config, deps)
    }

    /// Create a manager with explicit collaborators.
    pub fn with_deps(config: EngineConfig, deps: EngineDeps) -> Arc<Self> {
        Arc::new(Self {
            governor: ResourceGovernor::new(config.budget),
            executor: ProcessExecutor::new(Arc::clone(&deps.runner), &config),
            scratch: TempFileManager::new(config.temp_root.clone()),
            probe: deps.probe,
            bus: deps.bus,
            metrics: deps.metrics,
            policy: deps.policy,
            shutdown_token: CancellationToken::new(),
            state: Mutex::new(ManagerState {
                records: HashMap::new(),
                queue: VecDeque::new(),
                active: 0,
                draining: false,
                cancels: HashMap::new(),
                tasks: HashMap::new(),
            }),
            config,
        })
    }

    // -- submission surface -------------------------------------------------

    /// Submit a job. Never blocks: the command is built and validated
    /// synchronously, then the job is either dispatched immediately or
    /// queued. Must be called from within a Tokio runtime.
    pub fn submit(self: &Arc<Self>, job: Job) -> Result<JobId, SubmitError> {
        let command = job.to_command(&self.config.ffmpeg_path)?;
        let estimate = job.estimate.unwrap_or(self.config.default_estimate);
        let id = Uuid::new_v4();
        let job = Arc::new(job);

        let mut state = self.state();
        if state.draining {
            return Err(SubmitError::ShuttingDown);
        }

        let can_dispatch = state.active < self.config.max_concurrent
            && self.governor.check_available(&estimate).is_admit();
        if !can_dispatch && state.queue.len() >= self.config.queue_capacity {
            // Rejected before anything was recorded — queue contents and
            // record map are untouched.
            return Err(SubmitError::QueueFull {
                capacity: self.config.queue_capacity,
            });
        }

        state
            .records
            .insert(id, JobRecord::new(id, Arc::clone(&job)));
        self.metrics.incr_counter(metrics::METRIC_JOBS_SUBMITTED);
        self.publish(id, JobEventKind::Submitted);

        if can_dispatch {
            self.governor.reserve(&estimate);
            state.active += 1;
            self.dispatch_locked(&mut state, id, command, estimate);
        } else {
            state.queue.push_back(QueuedJob {
                id,
                priority: job.priority,
                estimate,
                command,
            });
            self.metrics
                .set_gauge(metrics::METRIC_QUEUE_DEPTH, state.queue.len() as f64);
            tracing::debug!(job_id = %id, depth = state.queue.len(), "Job queued");
        }

        Ok(id)
    }

    /// Cancel a job. Idempotent; returns `false` for unknown jobs and jobs
    /// already in a terminal state.
    pub fn cancel(&self, id: JobId) -> bool {
        let mut state = self.state();
        let Some(record) = state.records.get_mut(&id) else {
            return false;
        };

        match record.status {
            JobStatus::Pending => {
                // Dequeue without ever spawning a process.
                if record.transition(JobStatus::Cancelled).is_err() {
                    return false;
                }
                record.error = Some(JobFailure::Cancelled);
                state.queue.retain(|q| q.id != id);
                state.cancels.remove(&id);
                self.metrics.incr_counter(metrics::METRIC_JOBS_CANCELLED);
                self.metrics
                    .set_gauge(metrics::METRIC_QUEUE_DEPTH, state.queue.len() as f64);
                self.publish(id, JobEventKind::Cancelled);
                tracing::info!(job_id = %id, "Cancelled pending job");
                true
            }
            JobStatus::Running => {
                // Signal the worker; the executor escalates
                // terminate -> grace -> kill and finalization follows.
                if let Some(token) = state.cancels.get(&id) {
                    token.cancel();
                }
                tracing::info!(job_id = %id, "Cancellation requested for running job");
                true
            }
            _ => false,
        }
    }

    /// Snapshot of a job's record. Synchronous; never touches process I/O.
    pub fn status(&self, id: JobId) -> Option<JobRecord> {
        self.state().records.get(&id).cloned()
    }

    /// Subscribe to lifecycle and progress events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<JobEvent> {
        self.bus.subscribe()
    }

    /// Drop a terminal job's record. Returns `false` if the job is unknown
    /// or still pending/running. Keeps long-lived managers from growing
    /// without bound.
    pub fn remove(&self, id: JobId) -> bool {
        let mut state = self.state();
        match state.records.get(&id) {
            Some(record) if record.status.is_terminal() => {
                state.records.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Number of currently running jobs.
    pub fn active_count(&self) -> usize {
        self.state().active
    }

    /// Number of jobs waiting in the queue.
    pub fn queued_count(&self) -> usize {
        self.state().queue.len()
    }

    /// The live-process registry.
    pub fn registry(&self) -> &ProcessRegistry {
        self.executor.registry()
    }

    /// Stop admitting work, cancel everything, and wait up to `grace` for
    /// all jobs to reach a terminal state.
    pub async fn shutdown(&self, grace: Duration) {
        tracing::info!("Shutting down job manager");

        let handles: Vec<JoinHandle<()>> = {
            let mut state = self.state();
            state.draining = true;

            // Everything still queued is cancelled in place.
            let drained: Vec<QueuedJob> = state.queue.drain(..).collect();
            for queued in &drained {
                if let Some(record) = state.records.get_mut(&queued.id) {
                    if record.transition(JobStatus::Cancelled).is_ok() {
                        record.error = Some(JobFailure::Cancelled);
                        self.metrics.incr_counter(metrics::METRIC_JOBS_CANCELLED);
                        self.publish(queued.id, JobEventKind::Cancelled);
                    }
                }
            }
            self.metrics.set_gauge(metrics::METRIC_QUEUE_DEPTH, 0.0);

            state.tasks.drain().map(|(_, handle)| handle).collect()
        };

        // Running jobs get the shared escalation path via the master token.
        self.shutdown_token.cancel();

        if !handles.is_empty() {
            let _ = tokio::time::timeout(grace, futures::future::join_all(handles)).await;
        }

        tracing::info!("Job manager shut down complete");
    }

    // -- dispatch and completion --------------------------------------------

    /// Hand a job to a worker task. Caller holds the state lock and has
    /// already incremented `active` and reserved the governor allocation.
    fn dispatch_locked(
        self: &Arc<Self>,
        state: &mut ManagerState,
        id: JobId,
        command: Command,
        estimate: ResourceEstimate,
    ) {
        let Some(record) = state.records.get_mut(&id) else {
            tracing::error!(job_id = %id, "Dispatch for unknown job record");
            state.active = state.active.saturating_sub(1);
            self.governor.release(&estimate);
            return;
        };
        if let Err(e) = record.transition(JobStatus::Running) {
            tracing::error!(job_id = %id, error = %e, "Dispatch transition rejected");
            state.active = state.active.saturating_sub(1);
            self.governor.release(&estimate);
            return;
        }

        let waited = (chrono::Utc::now() - record.created_at).num_milliseconds() as f64 / 1000.0;
        self.metrics.incr_counter(metrics::METRIC_JOBS_DISPATCHED);
        self.metrics
            .observe(metrics::METRIC_QUEUE_WAIT_SECONDS, waited.max(0.0));
        self.metrics
            .set_gauge(metrics::METRIC_JOBS_ACTIVE, state.active as f64);
        self.publish(id, JobEventKind::Dispatched);
        tracing::info!(job_id = %id, active = state.active, "Job dispatched");

        let token = self.shutdown_token.child_token();
        state.cancels.insert(id, token.clone());

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            manager.drive_job(id, command, estimate, token).await;
        });
        state.tasks.insert(id, handle);
    }

    /// The worker task: scratch dir, probe, spawn, pump progress, finalize.
    async fn drive_job(
        self: Arc<Self>,
        id: JobId,
        command: Command,
        estimate: ResourceEstimate,
        cancel: CancellationToken,
    ) {
        let Some(job) = self.state().records.get(&id).map(|r| Arc::clone(&r.job)) else {
            tracing::error!(job_id = %id, "Worker started for unknown job record");
            return;
        };

        let scratch_dir = match self.scratch.create_scratch_dir(id).await {
            Ok(path) => Some(path),
            Err(e) => {
                self.finalize(
                    id,
                    JobStatus::Failed,
                    Some(JobFailure::Spawn(format!(
                        "failed to create scratch dir: {e}"
                    ))),
                    None,
                    estimate,
                )
                .await;
                return;
            }
        };

        // Probe once for the total duration; failure only costs percentages.
        let total_duration = match job.probe_path() {
            Some(path) => match self.probe.probe(path).await {
                Ok(info) => info.duration_secs,
                Err(e) => {
                    tracing::warn!(job_id = %id, error = %e, "Probe failed; progress percent disabled");
                    None
                }
            },
            None => None,
        };

        // The timeout clock starts inside spawn — queue wait never counted.
        let mut handle = match self
            .executor
            .spawn(id, &command, job.timeout, cancel.clone())
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "Process spawn failed");
                self.finalize(
                    id,
                    JobStatus::Failed,
                    Some(JobFailure::Spawn(e.to_string())),
                    scratch_dir,
                    estimate,
                )
                .await;
                return;
            }
        };

        if let Some(record) = self.state().records.get_mut(&id) {
            record.pid = handle.pid();
        }

        // Pump diagnostics concurrently with the wait so a chatty process
        // can never fill its stderr pipe.
        let lines = handle.take_diagnostics();
        let pump = {
            let manager = Arc::clone(&self);
            let mut tracker =
                ProgressTracker::new(total_duration, self.config.diagnostic_tail_lines);
            tokio::spawn(async move {
                if let Some(mut lines) = lines {
                    while let Some(line) = lines.recv().await {
                        if let Some(progress) = tracker.ingest(&line) {
                            manager.record_progress(id, progress);
                        }
                    }
                }
                tracker.into_tail()
            })
        };

        let outcome = handle.wait().await;
        let diagnostic_tail = pump.await.unwrap_or_default();

        let (status, error) = match outcome {
            ExecutionOutcome::Completed => (JobStatus::Completed, None),
            ExecutionOutcome::Exited { exit_code } => (
                JobStatus::Failed,
                Some(JobFailure::Exit {
                    exit_code,
                    diagnostic_tail,
                }),
            ),
            ExecutionOutcome::TimedOut => (JobStatus::TimedOut, Some(JobFailure::Timeout)),
            ExecutionOutcome::Cancelled => (JobStatus::Cancelled, Some(JobFailure::Cancelled)),
            ExecutionOutcome::ResourceExceeded { usage } => (
                JobStatus::Failed,
                Some(JobFailure::ResourceExceeded { usage }),
            ),
        };

        self.finalize(id, status, error, scratch_dir, estimate).await;
    }

    /// Store the latest progress on the record and publish it.
    fn record_progress(&self, id: JobId, progress: remux_core::progress::Progress) {
        if let Some(record) = self.state().records.get_mut(&id) {
            record.last_progress = Some(progress.clone());
        }
        self.publish(id, JobEventKind::Progress { progress });
    }

    /// Terminal bookkeeping: scratch cleanup, record transition, slot and
    /// governor release, queued-job promotion. Runs on every terminal path.
    async fn finalize(
        self: &Arc<Self>,
        id: JobId,
        status: JobStatus,
        error: Option<JobFailure>,
        scratch_dir: Option<PathBuf>,
        estimate: ResourceEstimate,
    ) {
        // Cleanup is attempted before the terminal status becomes
        // observable, and its failure never replaces the job's error.
        if let Some(dir) = &scratch_dir {
            self.scratch.cleanup(id, dir).await;
        }

        let resource_killed = matches!(error, Some(JobFailure::ResourceExceeded { .. }));
        let event = match status {
            JobStatus::Completed => JobEventKind::Completed,
            JobStatus::TimedOut => JobEventKind::TimedOut,
            JobStatus::Cancelled => JobEventKind::Cancelled,
            _ => JobEventKind::Failed {
                error: error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "unknown failure".to_string()),
            },
        };

        let mut state = self.state();
        if let Some(record) = state.records.get_mut(&id) {
            match record.transition(status) {
                Ok(()) => {
                    record.error = error;
                    if let (Some(started), Some(completed)) =
                        (record.started_at, record.completed_at)
                    {
                        let secs = (completed - started).num_milliseconds() as f64 / 1000.0;
                        self.metrics
                            .observe(metrics::METRIC_JOB_DURATION_SECONDS, secs.max(0.0));
                    }
                }
                Err(e) => {
                    tracing::error!(job_id = %id, error = %e, "Terminal transition rejected");
                }
            }
        }
        state.cancels.remove(&id);
        state.tasks.remove(&id);
        state.active = state.active.saturating_sub(1);
        self.governor.release(&estimate);

        let counter = match status {
            JobStatus::Completed => metrics::METRIC_JOBS_COMPLETED,
            JobStatus::TimedOut => metrics::METRIC_JOBS_TIMED_OUT,
            JobStatus::Cancelled => metrics::METRIC_JOBS_CANCELLED,
            _ => metrics::METRIC_JOBS_FAILED,
        };
        self.metrics.incr_counter(counter);
        if resource_killed {
            self.metrics
                .incr_counter(metrics::METRIC_JOBS_RESOURCE_KILLED);
        }
        self.metrics
            .set_gauge(metrics::METRIC_JOBS_ACTIVE, state.active as f64);
        self.publish(id, event);
        tracing::info!(job_id = %id, status = %status, "Job finalized");

        // Promote queued jobs while slots and budget allow. Deferred jobs
        // are re-evaluated here, on every completion.
        if !state.draining {
            while state.active < self.config.max_concurrent {
                let admit = |estimate: &ResourceEstimate| {
                    self.governor.check_available(estimate).is_admit()
                };
                let Some(index) = self.policy.select_next(&state.queue, &admit) else {
                    break;
                };
                let Some(queued) = state.queue.remove(index) else {
                    break;
                };
                self.governor.reserve(&queued.estimate);
                state.active += 1;
                self.dispatch_locked(&mut state, queued.id, queued.command, queued.estimate);
            }
            self.metrics
                .set_gauge(metrics::METRIC_QUEUE_DEPTH, state.queue.len() as f64);
        }
    }

    // -- helpers -------------------------------------------------------------

    fn publish(&self, id: JobId, kind: JobEventKind) {
        self.bus.publish(JobEvent::new(id, kind));
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().expect("manager state lock poisoned")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

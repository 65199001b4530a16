//! Drives one spawned process to completion.
//!
//! [`ProcessExecutor::spawn`] launches a validated command through the
//! injected [`ProcessRunner`] and returns an [`ExecutionHandle`]: the pid,
//! the diagnostic line stream, optional piped stdio, and a completion signal
//! that resolves to an [`ExecutionOutcome`].
//!
//! Timeout and cancellation share one escalation path: graceful terminate,
//! wait out the grace period, force-kill. A resource sample above the hard
//! ceiling skips the grace period entirely. The active-process registry
//! entry is held by a guard whose `Drop` runs on every exit path — normal
//! exit, kill, spawn-side panic — so no path can leak an entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use remux_core::command::Command;

use crate::config::EngineConfig;
use crate::process::{ProcessRunner, ResourceUsage, RunningProcess};
use crate::record::JobId;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How a supervised process run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// The process exited with code 0.
    Completed,
    /// The process exited non-zero (or was killed by a foreign signal,
    /// reported as exit code -1).
    Exited { exit_code: i32 },
    /// The wall-clock timeout expired and the process was killed.
    TimedOut,
    /// The cancellation token fired and the process was killed.
    Cancelled,
    /// A usage sample exceeded the hard ceiling; killed without grace.
    ResourceExceeded { usage: ResourceUsage },
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The set of live processes, one entry per `Running` job.
///
/// Entries are inserted at spawn and removed by [`RegistryGuard::drop`].
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<HashMap<JobId, Option<u32>>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry and return the guard that owns it.
    fn register(&self, job_id: JobId, pid: Option<u32>) -> RegistryGuard {
        self.lock().insert(job_id, pid);
        RegistryGuard {
            registry: self.clone(),
            job_id,
        }
    }

    /// Number of live processes.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether a process is registered for `job_id`.
    pub fn contains(&self, job_id: &JobId) -> bool {
        self.lock().contains_key(job_id)
    }

    /// The registered pid for `job_id`, if any.
    pub fn pid_of(&self, job_id: &JobId) -> Option<u32> {
        self.lock().get(job_id).copied().flatten()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, Option<u32>>> {
        self.inner.lock().expect("process registry lock poisoned")
    }
}

/// Scoped registry entry: dropping it removes the entry, no matter which
/// path the supervisor task took to get there.
struct RegistryGuard {
    registry: ProcessRegistry,
    job_id: JobId,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.job_id);
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A handle to one supervised process run.
pub struct ExecutionHandle {
    pid: Option<u32>,
    diagnostics: Option<mpsc::Receiver<String>>,
    stdin: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    stdout: Option<Box<dyn AsyncRead + Send + Unpin>>,
    done: oneshot::Receiver<ExecutionOutcome>,
}

impl ExecutionHandle {
    /// OS process id of the spawned child.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Take the raw diagnostic line stream. Finite — ends when the process
    /// closes stderr — and not restartable.
    pub fn take_diagnostics(&mut self) -> Option<mpsc::Receiver<String>> {
        self.diagnostics.take()
    }

    /// Writable stdin for piped streaming jobs.
    pub fn take_stdin(&mut self) -> Option<Box<dyn AsyncWrite + Send + Unpin>> {
        self.stdin.take()
    }

    /// Readable stdout for piped streaming jobs.
    pub fn take_stdout(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin>> {
        self.stdout.take()
    }

    /// Wait for the run to reach an outcome.
    pub async fn wait(self) -> ExecutionOutcome {
        // The supervisor only drops the sender after sending; a missing
        // outcome means it panicked, which we surface as a failed exit.
        self.done.await.unwrap_or(ExecutionOutcome::Exited { exit_code: -1 })
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Spawns and supervises processes for the job manager.
pub struct ProcessExecutor {
    runner: Arc<dyn ProcessRunner>,
    registry: ProcessRegistry,
    grace_period: Duration,
    sample_interval: Duration,
    memory_ceiling_bytes: u64,
    cpu_ceiling_percent: f32,
}

impl ProcessExecutor {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: &EngineConfig) -> Self {
        Self {
            runner,
            registry: ProcessRegistry::new(),
            grace_period: config.grace_period,
            sample_interval: config.usage_sample_interval,
            memory_ceiling_bytes: config.memory_ceiling_bytes,
            cpu_ceiling_percent: config.cpu_ceiling_percent,
        }
    }

    /// The live-process registry (shared with the manager and tests).
    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Spawn `command` and start supervising it.
    ///
    /// A spawn failure returns the I/O error directly — nothing was
    /// registered and there is nothing to clean up. On success the timeout
    /// clock starts now, at spawn, not at job submission.
    pub async fn spawn(
        &self,
        job_id: JobId,
        command: &Command,
        timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> std::io::Result<ExecutionHandle> {
        let mut process = self.runner.spawn(command).await?;
        let pid = process.pid();
        let guard = self.registry.register(job_id, pid);

        let diagnostics = process.take_diagnostics();
        let stdin = process.take_stdin();
        let stdout = process.take_stdout();

        let (done_tx, done_rx) = oneshot::channel();
        let grace_period = self.grace_period;
        let sample_interval = self.sample_interval;
        let memory_ceiling = self.memory_ceiling_bytes;
        let cpu_ceiling = self.cpu_ceiling_percent;

        tokio::spawn(async move {
            // The guard travels into the supervisor; its Drop is the single
            // point of registry eviction.
            let _guard = guard;
            let outcome = supervise(
                &mut process,
                timeout,
                cancel,
                grace_period,
                sample_interval,
                memory_ceiling,
                cpu_ceiling,
            )
            .await;
            let _ = done_tx.send(outcome);
        });

        Ok(ExecutionHandle {
            pid,
            diagnostics,
            stdin,
            stdout,
            done: done_rx,
        })
    }
}

/// The supervision loop for one process.
async fn supervise(
    process: &mut Box<dyn RunningProcess>,
    timeout: Option<Duration>,
    cancel: CancellationToken,
    grace_period: Duration,
    sample_interval: Duration,
    memory_ceiling_bytes: u64,
    cpu_ceiling_percent: f32,
) -> ExecutionOutcome {
    let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
    let timeout_expired = async move {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(timeout_expired);

    let mut sampler = tokio::time::interval(sample_interval);
    sampler.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first interval tick fires immediately; skip it so sampling starts
    // one interval after spawn.
    sampler.tick().await;

    loop {
        tokio::select! {
            exit = process.wait() => {
                return match exit {
                    Ok(exit) if exit.success() => ExecutionOutcome::Completed,
                    Ok(exit) => ExecutionOutcome::Exited {
                        exit_code: exit.code.unwrap_or(-1),
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "Waiting on child process failed");
                        ExecutionOutcome::Exited { exit_code: -1 }
                    }
                };
            }
            _ = cancel.cancelled() => {
                escalate(process, grace_period).await;
                return ExecutionOutcome::Cancelled;
            }
            _ = &mut timeout_expired => {
                escalate(process, grace_period).await;
                return ExecutionOutcome::TimedOut;
            }
            _ = sampler.tick() => {
                if let Some(usage) = process.sample_usage() {
                    if usage.memory_bytes > memory_ceiling_bytes
                        || usage.cpu_percent > cpu_ceiling_percent
                    {
                        // Hard ceiling: no grace period.
                        process.kill().await;
                        return ExecutionOutcome::ResourceExceeded { usage };
                    }
                }
            }
        }
    }
}

/// Graceful signal, grace window, then force-kill.
async fn escalate(process: &mut Box<dyn RunningProcess>, grace_period: Duration) {
    process.terminate();
    tokio::select! {
        _ = process.wait() => {}
        _ = tokio::time::sleep(grace_period) => {
            process.kill().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

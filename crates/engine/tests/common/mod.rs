//! Shared test doubles for the engine integration tests.
//!
//! [`FakeRunner`] implements the process capability seam with scripted
//! behaviors so the full manager/executor stack can be exercised without
//! spawning real OS processes. Behaviors are selected by matching a pattern
//! against the spawned command's argv, which keeps concurrent dispatch
//! deterministic regardless of task interleaving.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};

use remux_core::command::Command;
use remux_engine::process::{ProcessExit, ProcessRunner, ResourceUsage, RunningProcess};

/// What a fake process should do once spawned.
#[derive(Debug, Clone)]
pub enum FakeBehavior {
    /// Emit `lines` to the diagnostic stream, then exit with `code` after
    /// `run_for`. Honors the graceful termination signal.
    Exit {
        code: i32,
        run_for: Duration,
        lines: Vec<String>,
    },
    /// Run forever; exits promptly on the graceful termination signal.
    RunUntilSignalled,
    /// Run forever and ignore the graceful signal; only a kill ends it.
    IgnoreTerminate,
    /// Run forever, reporting `usage` on every sample. Honors terminate.
    ReportUsage { usage: ResourceUsage },
    /// Fail the spawn itself with a not-found error.
    FailSpawn,
}

impl FakeBehavior {
    pub fn quick_exit(code: i32) -> Self {
        FakeBehavior::Exit {
            code,
            run_for: Duration::from_millis(50),
            lines: Vec::new(),
        }
    }
}

/// Scripted [`ProcessRunner`].
///
/// The first rule whose pattern is a substring of any argv element wins;
/// otherwise `default_behavior` applies.
pub struct FakeRunner {
    rules: Mutex<Vec<(String, FakeBehavior)>>,
    default_behavior: Mutex<FakeBehavior>,
    spawn_count: AtomicUsize,
    next_pid: AtomicU32,
}

impl FakeRunner {
    pub fn new(default_behavior: FakeBehavior) -> Arc<Self> {
        Arc::new(Self {
            rules: Mutex::new(Vec::new()),
            default_behavior: Mutex::new(default_behavior),
            spawn_count: AtomicUsize::new(0),
            next_pid: AtomicU32::new(1000),
        })
    }

    /// Apply `behavior` to commands whose argv contains `pattern`.
    pub fn rule(self: &Arc<Self>, pattern: impl Into<String>, behavior: FakeBehavior) {
        self.rules.lock().unwrap().push((pattern.into(), behavior));
    }

    /// How many processes were spawned so far.
    pub fn spawn_count(&self) -> usize {
        self.spawn_count.load(Ordering::SeqCst)
    }

    fn behavior_for(&self, command: &Command) -> FakeBehavior {
        let rules = self.rules.lock().unwrap();
        for (pattern, behavior) in rules.iter() {
            if command.args().iter().any(|arg| arg.contains(pattern.as_str())) {
                return behavior.clone();
            }
        }
        self.default_behavior.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn spawn(&self, command: &Command) -> std::io::Result<Box<dyn RunningProcess>> {
        let behavior = self.behavior_for(command);
        if matches!(behavior, FakeBehavior::FailSpawn) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "fake binary not found",
            ));
        }
        self.spawn_count.fetch_add(1, Ordering::SeqCst);

        let (diag_tx, diag_rx) = mpsc::channel(256);
        if let FakeBehavior::Exit { lines, .. } = &behavior {
            for line in lines {
                let _ = diag_tx.try_send(line.clone());
            }
        }
        // Dropping diag_tx closes the stream, matching a real process that
        // has written everything it will ever write.

        let (term_tx, term_rx) = watch::channel(false);
        let (kill_tx, kill_rx) = watch::channel(false);

        Ok(Box::new(FakeProcess {
            behavior,
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            started: tokio::time::Instant::now(),
            term_tx,
            term_rx,
            kill_tx,
            kill_rx,
            diagnostics: Some(diag_rx),
        }))
    }
}

/// A scripted live process.
struct FakeProcess {
    behavior: FakeBehavior,
    pid: u32,
    started: tokio::time::Instant,
    term_tx: watch::Sender<bool>,
    term_rx: watch::Receiver<bool>,
    kill_tx: watch::Sender<bool>,
    kill_rx: watch::Receiver<bool>,
    diagnostics: Option<mpsc::Receiver<String>>,
}

#[async_trait]
impl RunningProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn take_diagnostics(&mut self) -> Option<mpsc::Receiver<String>> {
        self.diagnostics.take()
    }

    fn take_stdin(&mut self) -> Option<Box<dyn AsyncWrite + Send + Unpin>> {
        None
    }

    fn take_stdout(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin>> {
        None
    }

    async fn wait(&mut self) -> std::io::Result<ProcessExit> {
        let honors_terminate = !matches!(self.behavior, FakeBehavior::IgnoreTerminate);
        let natural_exit = match &self.behavior {
            FakeBehavior::Exit { code, run_for, .. } => Some((*code, self.started + *run_for)),
            _ => None,
        };

        let mut kill_rx = self.kill_rx.clone();
        let mut term_rx = self.term_rx.clone();
        let natural = async {
            match natural_exit {
                Some((code, at)) => {
                    tokio::time::sleep_until(at).await;
                    code
                }
                None => std::future::pending().await,
            }
        };
        let terminated = async move {
            if honors_terminate {
                let _ = term_rx.wait_for(|terminated| *terminated).await;
            } else {
                // The graceful signal is ignored; only a kill ends this one.
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            code = natural => Ok(ProcessExit { code: Some(code), signal_killed: false }),
            _ = kill_rx.wait_for(|killed| *killed) => {
                Ok(ProcessExit { code: None, signal_killed: true })
            }
            _ = terminated => Ok(ProcessExit { code: None, signal_killed: true }),
        }
    }

    fn terminate(&mut self) {
        let _ = self.term_tx.send(true);
    }

    async fn kill(&mut self) {
        let _ = self.kill_tx.send(true);
    }

    fn sample_usage(&mut self) -> Option<ResourceUsage> {
        match &self.behavior {
            FakeBehavior::ReportUsage { usage } => Some(*usage),
            _ => Some(ResourceUsage {
                memory_bytes: 1024 * 1024,
                cpu_percent: 5.0,
            }),
        }
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

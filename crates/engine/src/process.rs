//! The OS process capability seam.
//!
//! [`ProcessRunner`] and [`RunningProcess`] isolate every platform-specific
//! operation — spawn, signal, wait, usage sampling — behind one interface.
//! The engine only ever talks to these traits; [`OsProcessRunner`] is the
//! native implementation, and tests substitute scripted fakes.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;

use remux_core::command::{Command, StdioMode};

/// Capacity of the diagnostic line channel. The stderr reader never blocks
/// on a slow consumer: when the channel is full, lines are dropped so the
/// child's pipe cannot fill up and stall the process.
const DIAG_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Shared types
// ---------------------------------------------------------------------------

/// Sampled resource consumption of one running process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceUsage {
    /// Resident memory in bytes.
    pub memory_bytes: u64,
    /// CPU load in percent, one core = 100.
    pub cpu_percent: f32,
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// Whether a signal (rather than an exit) ended the process.
    pub signal_killed: bool,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Spawns processes from validated commands.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Spawn `command` as a child process with its declared stdio wiring.
    ///
    /// The returned process is already running; the argv is passed to the OS
    /// directly, never through a shell.
    async fn spawn(&self, command: &Command) -> std::io::Result<Box<dyn RunningProcess>>;
}

/// A single live child process.
#[async_trait]
pub trait RunningProcess: Send {
    /// OS process id, when the process is still identifiable.
    fn pid(&self) -> Option<u32>;

    /// Take the diagnostic line stream (stderr). Yields `None` once the
    /// process closes the stream; can be taken exactly once.
    fn take_diagnostics(&mut self) -> Option<mpsc::Receiver<String>>;

    /// Take the writable stdin handle (piped streaming jobs only).
    fn take_stdin(&mut self) -> Option<Box<dyn AsyncWrite + Send + Unpin>>;

    /// Take the readable stdout handle (piped streaming jobs only).
    fn take_stdout(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin>>;

    /// Wait for the process to exit and reap it.
    async fn wait(&mut self) -> std::io::Result<ProcessExit>;

    /// Deliver the graceful termination signal (SIGTERM to the process
    /// group on Unix). The process may ignore it; pair with [`kill`].
    ///
    /// [`kill`]: RunningProcess::kill
    fn terminate(&mut self);

    /// Force-kill the process and reap it.
    async fn kill(&mut self);

    /// Sample current OS-level resource usage, `None` once the process is
    /// gone.
    fn sample_usage(&mut self) -> Option<ResourceUsage>;
}

// ---------------------------------------------------------------------------
// Native implementation
// ---------------------------------------------------------------------------

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct OsProcessRunner;

#[async_trait]
impl ProcessRunner for OsProcessRunner {
    async fn spawn(&self, command: &Command) -> std::io::Result<Box<dyn RunningProcess>> {
        let mut cmd = tokio::process::Command::new(command.program());
        cmd.args(command.args())
            .stdin(stdio_for(command.stdin_mode()))
            .stdout(stdio_for(command.stdout_mode()))
            .stderr(Stdio::piped())
            // If the engine is dropped mid-job, the child must not outlive it.
            .kill_on_drop(true);

        for (key, value) in command.env() {
            cmd.env(key, value);
        }

        // Put the child in its own process group so the termination signal
        // reaches any helpers it forks.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn()?;
        let pid = child.id();

        let (diag_tx, diag_rx) = mpsc::channel(DIAG_CHANNEL_CAPACITY);
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    // Keep draining even when the consumer lags; a full
                    // channel drops the line instead of stalling the child.
                    let _ = diag_tx.try_send(line);
                }
            });
        }

        let stdin = child
            .stdin
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncWrite + Send + Unpin>);
        let stdout = child
            .stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Send + Unpin>);

        Ok(Box::new(OsProcess {
            child,
            pid,
            diagnostics: Some(diag_rx),
            stdin,
            stdout,
            system: sysinfo::System::new(),
        }))
    }
}

/// A live child spawned by [`OsProcessRunner`].
struct OsProcess {
    child: tokio::process::Child,
    pid: Option<u32>,
    diagnostics: Option<mpsc::Receiver<String>>,
    stdin: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    stdout: Option<Box<dyn AsyncRead + Send + Unpin>>,
    system: sysinfo::System,
}

#[async_trait]
impl RunningProcess for OsProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn take_diagnostics(&mut self) -> Option<mpsc::Receiver<String>> {
        self.diagnostics.take()
    }

    fn take_stdin(&mut self) -> Option<Box<dyn AsyncWrite + Send + Unpin>> {
        self.stdin.take()
    }

    fn take_stdout(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin>> {
        self.stdout.take()
    }

    async fn wait(&mut self) -> std::io::Result<ProcessExit> {
        let status = self.child.wait().await?;
        Ok(ProcessExit {
            code: status.code(),
            signal_killed: status.code().is_none(),
        })
    }

    #[cfg(unix)]
    fn terminate(&mut self) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = self.pid {
            // The child leads its own process group (process_group(0)).
            let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) {
        // No graceful signal on this platform; fall through to the kill the
        // executor issues after the grace period.
        let _ = self.child.start_kill();
    }

    async fn kill(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;
            let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
        }
        // Reaps the child (and covers the non-group case).
        let _ = self.child.kill().await;
    }

    fn sample_usage(&mut self) -> Option<ResourceUsage> {
        use sysinfo::{Pid, ProcessesToUpdate};

        let pid = Pid::from_u32(self.pid?);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = self.system.process(pid)?;
        Some(ResourceUsage {
            memory_bytes: process.memory(),
            cpu_percent: process.cpu_usage(),
        })
    }
}

fn stdio_for(mode: StdioMode) -> Stdio {
    match mode {
        StdioMode::File => Stdio::null(),
        StdioMode::Inherit => Stdio::inherit(),
        StdioMode::Piped => Stdio::piped(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use remux_core::command::StdioMode;

    fn sh(script: &str) -> Command {
        Command::from_parts(
            "sh",
            vec!["-c".into(), script.into()],
            StdioMode::File,
            StdioMode::File,
        )
    }

    #[tokio::test]
    async fn spawn_and_wait_captures_exit_code() {
        let mut process = OsProcessRunner.spawn(&sh("exit 7")).await.unwrap();
        let exit = process.wait().await.unwrap();
        assert_eq!(exit.code, Some(7));
        assert!(!exit.signal_killed);
    }

    #[tokio::test]
    async fn diagnostics_stream_stderr_lines() {
        let mut process = OsProcessRunner
            .spawn(&sh("printf 'one\\ntwo\\n' >&2"))
            .await
            .unwrap();
        let mut rx = process.take_diagnostics().unwrap();
        process.wait().await.unwrap();

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        assert_eq!(lines, ["one", "two"]);
    }

    #[tokio::test]
    async fn diagnostics_can_only_be_taken_once() {
        let mut process = OsProcessRunner.spawn(&sh("exit 0")).await.unwrap();
        assert!(process.take_diagnostics().is_some());
        assert!(process.take_diagnostics().is_none());
        process.wait().await.unwrap();
    }

    #[tokio::test]
    async fn kill_ends_a_sleeping_process() {
        let mut process = OsProcessRunner.spawn(&sh("sleep 30")).await.unwrap();
        process.kill().await;
        let exit = process.wait().await.unwrap();
        assert!(exit.signal_killed);
    }

    #[tokio::test]
    async fn spawn_missing_binary_is_an_io_error() {
        let command = Command::from_parts(
            "definitely-not-a-real-binary-3141",
            vec![],
            StdioMode::File,
            StdioMode::File,
        );
        assert!(OsProcessRunner.spawn(&command).await.is_err());
    }
}

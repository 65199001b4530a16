//! The immutable job submission type.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use remux_core::command::{Command, CommandBuilder, GlobalOptions, InputSpec, OutputSpec};
use remux_core::scheduling::PRIORITY_NORMAL;
use remux_core::ValidationError;

/// Predicted resource consumption for one job, used by the governor for
/// admission decisions. CPU percent is per-core (one core = 100).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceEstimate {
    pub memory_bytes: u64,
    pub cpu_percent: f32,
}

impl Default for ResourceEstimate {
    fn default() -> Self {
        Self {
            memory_bytes: 1024 * 1024 * 1024,
            cpu_percent: 100.0,
        }
    }
}

/// A caller-supplied job description. Immutable once submitted — the manager
/// stores it behind an `Arc` and never writes to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Input sources, in argv order.
    pub inputs: Vec<InputSpec>,
    /// Output targets, in argv order.
    pub outputs: Vec<OutputSpec>,
    /// Invocation-wide options.
    pub global: GlobalOptions,
    /// Optional named preset applied to every output.
    pub preset: Option<String>,
    /// Wall-clock timeout, measured from process spawn (never from
    /// submission — queueing delay does not count).
    pub timeout: Option<Duration>,
    /// Scheduling priority (see `remux_core::scheduling` constants).
    /// The default FIFO policy ignores it beyond arrival order.
    pub priority: i32,
    /// Predicted resource usage; the engine default applies when `None`.
    pub estimate: Option<ResourceEstimate>,
}

impl Job {
    /// A job with the given inputs and outputs and default options.
    pub fn new(inputs: Vec<InputSpec>, outputs: Vec<OutputSpec>) -> Self {
        Self {
            inputs,
            outputs,
            global: GlobalOptions::default(),
            preset: None,
            timeout: None,
            priority: PRIORITY_NORMAL,
            estimate: None,
        }
    }

    /// Convenience: a single-input, single-output job.
    pub fn transcode(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self::new(
            vec![InputSpec::new(input)],
            vec![OutputSpec::new(output)],
        )
    }

    pub fn with_preset(mut self, name: impl Into<String>) -> Self {
        self.preset = Some(name.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_estimate(mut self, estimate: ResourceEstimate) -> Self {
        self.estimate = Some(estimate);
        self
    }

    /// Build the validated command for this job against `program`.
    ///
    /// Pure and synchronous; called by `submit` before anything is queued.
    pub(crate) fn to_command(&self, program: &str) -> Result<Command, ValidationError> {
        let mut builder = CommandBuilder::new()
            .program(program)
            .global_options(self.global.clone());
        for input in &self.inputs {
            builder = builder.add_input(input.clone());
        }
        for output in &self.outputs {
            builder = builder.add_output(output.clone());
        }
        if let Some(preset) = &self.preset {
            builder = builder.preset(preset.clone());
        }
        builder.build()
    }

    /// Path of the first file-backed input, used for the probe step.
    pub(crate) fn probe_path(&self) -> Option<&str> {
        self.inputs
            .iter()
            .map(|i| i.path.as_str())
            .find(|p| *p != remux_core::command::PIPE_PATH)
    }
}

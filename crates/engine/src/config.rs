//! Engine configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::governor::ResourceBudget;
use crate::job::ResourceEstimate;

/// Engine configuration.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of concurrently running jobs (default: `2`).
    pub max_concurrent: usize,
    /// Maximum number of jobs waiting in the queue (default: `64`).
    pub queue_capacity: usize,
    /// Wait between the graceful termination signal and the force-kill
    /// (default: `5s`).
    pub grace_period: Duration,
    /// Interval between resource usage samples (default: `1s`).
    pub usage_sample_interval: Duration,
    /// Per-job hard memory ceiling in bytes; a sample above this kills the
    /// process immediately (default: `4 GiB`).
    pub memory_ceiling_bytes: u64,
    /// Per-job hard CPU ceiling in percent, where one core = 100
    /// (default: `800`).
    pub cpu_ceiling_percent: f32,
    /// Aggregate budget across all running jobs.
    pub budget: ResourceBudget,
    /// Estimate assumed for jobs that do not declare one.
    pub default_estimate: ResourceEstimate,
    /// Root directory for per-job scratch space (default: the OS temp dir).
    pub temp_root: PathBuf,
    /// Media binary invoked for jobs (default: `ffmpeg`).
    pub ffmpeg_path: String,
    /// Probe binary invoked once per job (default: `ffprobe`).
    pub ffprobe_path: String,
    /// Diagnostic lines retained for non-zero-exit error reports
    /// (default: `20`).
    pub diagnostic_tail_lines: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            queue_capacity: 64,
            grace_period: Duration::from_secs(5),
            usage_sample_interval: Duration::from_secs(1),
            memory_ceiling_bytes: 4 * 1024 * 1024 * 1024,
            cpu_ceiling_percent: 800.0,
            budget: ResourceBudget::default(),
            default_estimate: ResourceEstimate::default(),
            temp_root: std::env::temp_dir(),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            diagnostic_tail_lines: 20,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default          |
    /// |---------------------------------|------------------|
    /// | `REMUX_MAX_CONCURRENT`          | `2`              |
    /// | `REMUX_QUEUE_CAPACITY`          | `64`             |
    /// | `REMUX_GRACE_PERIOD_SECS`       | `5`              |
    /// | `REMUX_SAMPLE_INTERVAL_MS`      | `1000`           |
    /// | `REMUX_MEMORY_CEILING_BYTES`    | `4294967296`     |
    /// | `REMUX_CPU_CEILING_PERCENT`     | `800`            |
    /// | `REMUX_BUDGET_MEMORY_BYTES`     | `17179869184`    |
    /// | `REMUX_BUDGET_CPU_PERCENT`      | `1600`           |
    /// | `REMUX_TEMP_ROOT`               | OS temp dir      |
    /// | `REMUX_FFMPEG_PATH`             | `ffmpeg`         |
    /// | `REMUX_FFPROBE_PATH`            | `ffprobe`        |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_concurrent: env_parse("REMUX_MAX_CONCURRENT", defaults.max_concurrent),
            queue_capacity: env_parse("REMUX_QUEUE_CAPACITY", defaults.queue_capacity),
            grace_period: Duration::from_secs(env_parse(
                "REMUX_GRACE_PERIOD_SECS",
                defaults.grace_period.as_secs(),
            )),
            usage_sample_interval: Duration::from_millis(env_parse(
                "REMUX_SAMPLE_INTERVAL_MS",
                defaults.usage_sample_interval.as_millis() as u64,
            )),
            memory_ceiling_bytes: env_parse(
                "REMUX_MEMORY_CEILING_BYTES",
                defaults.memory_ceiling_bytes,
            ),
            cpu_ceiling_percent: env_parse(
                "REMUX_CPU_CEILING_PERCENT",
                defaults.cpu_ceiling_percent,
            ),
            budget: ResourceBudget {
                max_memory_bytes: env_parse(
                    "REMUX_BUDGET_MEMORY_BYTES",
                    defaults.budget.max_memory_bytes,
                ),
                max_cpu_percent: env_parse(
                    "REMUX_BUDGET_CPU_PERCENT",
                    defaults.budget.max_cpu_percent,
                ),
            },
            default_estimate: defaults.default_estimate,
            temp_root: std::env::var("REMUX_TEMP_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_root),
            ffmpeg_path: std::env::var("REMUX_FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: std::env::var("REMUX_FFPROBE_PATH").unwrap_or(defaults.ffprobe_path),
            diagnostic_tail_lines: defaults.diagnostic_tail_lines,
        }
    }
}

/// Read an env var and parse it, panicking on malformed values so
/// misconfiguration surfaces at startup rather than mid-job.
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}

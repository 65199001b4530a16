//! Single-job worker binary.
//!
//! Runs one transcode through the engine and exits non-zero unless the job
//! completes:
//!
//! ```text
//! remux-worker INPUT OUTPUT [PRESET] [TIMEOUT_SECS]
//! ```
//!
//! Engine settings come from `REMUX_*` environment variables (and `.env`).

use std::time::Duration;

use anyhow::{bail, Context};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use remux_engine::{EngineConfig, Job, JobManager, JobStatus};
use remux_events::JobEventKind;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "remux_worker=info,remux_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (input, output) = match args.as_slice() {
        [input, output, ..] => (input.clone(), output.clone()),
        _ => bail!("usage: remux-worker INPUT OUTPUT [PRESET] [TIMEOUT_SECS]"),
    };

    let mut job = Job::transcode(input, output);
    if let Some(preset) = args.get(2) {
        job = job.with_preset(preset.clone());
    }
    if let Some(raw) = args.get(3) {
        let secs: u64 = raw
            .parse()
            .with_context(|| format!("TIMEOUT_SECS must be a number, got '{raw}'"))?;
        job = job.with_timeout(Duration::from_secs(secs));
    }

    let config = EngineConfig::from_env();
    let grace = config.grace_period;
    let manager = JobManager::start(config);
    let mut events = manager.subscribe();

    let id = manager.submit(job).context("job submission rejected")?;
    tracing::info!(job_id = %id, "Job submitted");

    // Follow the event stream until our job reaches a terminal state.
    let status = loop {
        let event = events.recv().await.context("event stream closed")?;
        if event.job_id != id {
            continue;
        }
        match event.kind {
            JobEventKind::Progress { progress } => {
                tracing::info!(
                    out_time_secs = progress.out_time_secs,
                    percent = progress.percent,
                    speed = progress.speed,
                    "Progress",
                );
            }
            JobEventKind::Completed => break JobStatus::Completed,
            JobEventKind::Failed { error } => {
                tracing::error!(error = %error, "Job failed");
                break JobStatus::Failed;
            }
            JobEventKind::TimedOut => break JobStatus::TimedOut,
            JobEventKind::Cancelled => break JobStatus::Cancelled,
            JobEventKind::Submitted | JobEventKind::Dispatched => {}
        }
    };

    manager.shutdown(grace).await;

    match status {
        JobStatus::Completed => {
            tracing::info!(job_id = %id, "Job completed");
            Ok(())
        }
        other => {
            if let Some(record) = manager.status(id) {
                if let Some(error) = record.error {
                    bail!("job ended {other}: {error}");
                }
            }
            bail!("job ended {other}");
        }
    }
}

//! The media-probe collaborator.
//!
//! Run once per job before the process spawns, to learn the source's total
//! duration for progress percentages. The probe is a black box behind
//! [`MediaProbe`]; [`FfprobeProber`] is the native implementation, and a
//! probe failure never fails the job — progress just loses its percentage.

use async_trait::async_trait;

use remux_core::probe::{parse_duration, parse_framerate, parse_total_frames, ProbeReport};

/// Stream metadata consumed by the progress tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MediaInfo {
    /// Total duration in seconds, when the container knows it.
    pub duration_secs: Option<f64>,
    /// Video frame rate, 0.0 for audio-only sources.
    pub frame_rate: f64,
    /// Total frame count (explicit or estimated), 0 when unknown.
    pub total_frames: i64,
}

/// Errors from the probe step.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe binary not found: {0}")]
    BinaryNotFound(std::io::Error),

    #[error("probe execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse probe output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Supplies stream metadata for a media path.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, path: &str) -> Result<MediaInfo, ProbeError>;
}

/// [`MediaProbe`] that shells out to `ffprobe` with JSON output.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe_path: String,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }
}

#[async_trait]
impl MediaProbe for FfprobeProber {
    async fn probe(&self, path: &str) -> Result<MediaInfo, ProbeError> {
        let output = tokio::process::Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .await
            .map_err(ProbeError::BinaryNotFound)?;

        if !output.status.success() {
            return Err(ProbeError::ExecutionFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let report = serde_json::from_str::<ProbeReport>(&stdout)
            .map_err(|e| ProbeError::ParseError(format!("{e}: {stdout}")))?;

        Ok(MediaInfo {
            duration_secs: parse_duration(&report),
            frame_rate: parse_framerate(&report),
            total_frames: parse_total_frames(&report),
        })
    }
}

/// Probe that reports nothing. Used when no probe step is wanted.
#[derive(Debug, Clone, Default)]
pub struct NullProbe;

#[async_trait]
impl MediaProbe for NullProbe {
    async fn probe(&self, _path: &str) -> Result<MediaInfo, ProbeError> {
        Ok(MediaInfo::default())
    }
}

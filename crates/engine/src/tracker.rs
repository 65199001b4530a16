//! Turns the raw diagnostic stream into progress events and an error tail.
//!
//! [`ProgressTracker`] wraps the core [`ProgressParser`] and keeps a bounded
//! ring of the non-progress diagnostic lines (the actual error messages) so
//! a non-zero exit can report what the process last said. The stream is
//! finite — it ends when the process exits — and never restarts; each job
//! gets a fresh tracker.
//!
//! Delivery to subscribers happens on the manager's broadcast bus, which is
//! bounded with drop-oldest semantics: a lagged subscriber loses the oldest
//! events and can never block the stderr reader.

use std::collections::VecDeque;

use remux_core::progress::{Progress, ProgressParser};

/// Keys the progress stream is known to emit. Lines with these keys are
/// machine chatter, not error diagnostics, and stay out of the tail.
const PROGRESS_KEYS: &[&str] = &[
    "frame",
    "fps",
    "bitrate",
    "total_size",
    "out_time_us",
    "out_time_ms",
    "out_time",
    "dup_frames",
    "drop_frames",
    "speed",
    "progress",
];

/// Whether `line` is a `key=value` report from the progress stream.
fn is_progress_line(line: &str) -> bool {
    line.split_once('=')
        .is_some_and(|(key, _)| {
            let key = key.trim();
            PROGRESS_KEYS.contains(&key) || key.starts_with("stream_")
        })
}

/// Per-job diagnostic stream consumer.
#[derive(Debug)]
pub struct ProgressTracker {
    parser: ProgressParser,
    tail: VecDeque<String>,
    tail_capacity: usize,
}

impl ProgressTracker {
    /// `total_duration_secs` comes from the probe step; `None` disables
    /// percentage computation.
    pub fn new(total_duration_secs: Option<f64>, tail_capacity: usize) -> Self {
        Self {
            parser: ProgressParser::new(total_duration_secs),
            tail: VecDeque::with_capacity(tail_capacity),
            tail_capacity,
        }
    }

    /// Feed one diagnostic line.
    ///
    /// Returns a [`Progress`] when the line completes a progress block.
    /// Malformed and partial lines are skipped silently; lines that are not
    /// progress chatter are retained in the bounded tail ring.
    pub fn ingest(&mut self, line: &str) -> Option<Progress> {
        if !is_progress_line(line) && !line.trim().is_empty() {
            if self.tail.len() == self.tail_capacity {
                self.tail.pop_front();
            }
            self.tail.push_back(line.to_string());
        }
        self.parser.ingest_line(line)
    }

    /// The retained diagnostic tail, oldest first.
    pub fn into_tail(self) -> Vec<String> {
        self.tail.into()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

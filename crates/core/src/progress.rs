//! Incremental parser for the machine-readable progress stream.
//!
//! The wrapped binary writes blocks of `key=value` lines, one block per
//! reporting interval, each terminated by a `progress=continue` (or
//! `progress=end`) line. [`ProgressParser`] accumulates fields and emits one
//! [`Progress`] per terminator. Malformed or unknown lines are skipped
//! silently — a noisy diagnostic stream must never fail the job.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// A structured snapshot of in-flight execution status.
///
/// Transient: the engine keeps only the latest value per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Processed media time in seconds, monotonically non-decreasing.
    pub out_time_secs: f64,
    /// Completion percentage derived from the probed total duration,
    /// `None` when the total is unknown.
    pub percent: Option<f64>,
    /// Frames encoded so far.
    pub frame: Option<u64>,
    /// Current encoding frame rate.
    pub fps: Option<f64>,
    /// Encoding speed as a realtime multiplier (`1.0` = realtime).
    pub speed: Option<f64>,
    /// Current output bitrate in kbit/s.
    pub bitrate_kbps: Option<f64>,
}

/// Completion percentage for `processed` seconds of `total`, capped at 100.
///
/// Returns `None` when the total duration is unknown or zero.
pub fn completion_percent(processed_secs: f64, total_secs: Option<f64>) -> Option<f64> {
    match total_secs {
        Some(total) if total > 0.0 => Some(((processed_secs / total) * 100.0).min(100.0)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Accumulates `key=value` lines and flushes a [`Progress`] per block.
#[derive(Debug)]
pub struct ProgressParser {
    total_duration_secs: Option<f64>,
    last_out_time_secs: f64,
    frame: Option<u64>,
    fps: Option<f64>,
    speed: Option<f64>,
    bitrate_kbps: Option<f64>,
    out_time_secs: Option<f64>,
}

impl ProgressParser {
    /// Create a parser. `total_duration_secs` (from the probe step) enables
    /// percentage computation; pass `None` when the duration is unknown.
    pub fn new(total_duration_secs: Option<f64>) -> Self {
        Self {
            total_duration_secs,
            last_out_time_secs: 0.0,
            frame: None,
            fps: None,
            speed: None,
            bitrate_kbps: None,
            out_time_secs: None,
        }
    }

    /// Feed one diagnostic line. Returns a [`Progress`] when the line
    /// terminates a block, `None` otherwise (including for malformed lines).
    pub fn ingest_line(&mut self, line: &str) -> Option<Progress> {
        let line = line.trim();
        let (key, value) = line.split_once('=')?;
        let (key, value) = (key.trim(), value.trim());

        match key {
            "frame" => self.frame = value.parse().ok(),
            "fps" => self.fps = parse_optional_f64(value),
            "speed" => self.speed = parse_speed(value),
            "bitrate" => self.bitrate_kbps = parse_bitrate(value),
            // out_time_ms is microseconds despite the name; out_time_us is
            // the honestly-named duplicate emitted by newer builds.
            "out_time_us" | "out_time_ms" => {
                self.out_time_secs = value.parse::<i64>().ok().map(|us| us as f64 / 1_000_000.0);
            }
            "out_time" => self.out_time_secs = parse_clock_time(value),
            "progress" => return Some(self.flush()),
            // Unknown keys (stream_0_0_q, total_size, dup_frames, ...) are
            // valid stream content we simply do not track.
            _ => {}
        }
        None
    }

    /// Emit the accumulated block and reset per-block fields.
    fn flush(&mut self) -> Progress {
        // Clamp to non-decreasing: a block that omits or regresses the time
        // field must not move the job backwards.
        let out_time_secs = self
            .out_time_secs
            .unwrap_or(self.last_out_time_secs)
            .max(self.last_out_time_secs);
        self.last_out_time_secs = out_time_secs;

        let progress = Progress {
            out_time_secs,
            percent: completion_percent(out_time_secs, self.total_duration_secs),
            frame: self.frame,
            fps: self.fps,
            speed: self.speed,
            bitrate_kbps: self.bitrate_kbps,
        };

        self.frame = None;
        self.fps = None;
        self.speed = None;
        self.bitrate_kbps = None;
        self.out_time_secs = None;

        progress
    }
}

// ---------------------------------------------------------------------------
// Field parsing helpers
// ---------------------------------------------------------------------------

/// Parse a float field, treating `N/A` (and garbage) as absent.
fn parse_optional_f64(value: &str) -> Option<f64> {
    value.parse().ok()
}

/// Parse a speed multiplier like `2.5x`.
fn parse_speed(value: &str) -> Option<f64> {
    value.trim_end_matches('x').parse().ok()
}

/// Parse a bitrate like `1024.5kbits/s` into kbit/s.
fn parse_bitrate(value: &str) -> Option<f64> {
    value.trim_end_matches("kbits/s").trim().parse().ok()
}

/// Parse a clock time like `00:01:23.450000` into seconds.
fn parse_clock_time(value: &str) -> Option<f64> {
    let mut parts = value.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || hours < 0.0 || minutes < 0.0 || seconds < 0.0 {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(parser: &mut ProgressParser, lines: &[&str]) -> Vec<Progress> {
        lines
            .iter()
            .filter_map(|line| parser.ingest_line(line))
            .collect()
    }

    // -- block parsing --------------------------------------------------------

    #[test]
    fn well_formed_block_emits_one_progress() {
        let mut parser = ProgressParser::new(Some(120.0));
        let events = feed(
            &mut parser,
            &[
                "frame=300",
                "fps=29.97",
                "bitrate=1843.2kbits/s",
                "out_time_ms=10000000",
                "out_time=00:00:10.000000",
                "speed=1.25x",
                "progress=continue",
            ],
        );
        assert_eq!(events.len(), 1);
        let p = &events[0];
        assert!((p.out_time_secs - 10.0).abs() < 0.001);
        assert_eq!(p.frame, Some(300));
        assert!((p.fps.unwrap() - 29.97).abs() < 0.001);
        assert!((p.speed.unwrap() - 1.25).abs() < 0.001);
        assert!((p.bitrate_kbps.unwrap() - 1843.2).abs() < 0.001);
        assert!((p.percent.unwrap() - 8.333).abs() < 0.01);
    }

    #[test]
    fn no_event_before_terminator() {
        let mut parser = ProgressParser::new(None);
        assert!(parser.ingest_line("frame=1").is_none());
        assert!(parser.ingest_line("out_time=00:00:01.000000").is_none());
    }

    #[test]
    fn end_terminator_also_flushes() {
        let mut parser = ProgressParser::new(Some(10.0));
        let events = feed(&mut parser, &["out_time=00:00:10.000000", "progress=end"]);
        assert_eq!(events.len(), 1);
        assert!((events[0].percent.unwrap() - 100.0).abs() < f64::EPSILON);
    }

    // -- malformed input ------------------------------------------------------

    #[test]
    fn malformed_lines_emit_nothing() {
        let mut parser = ProgressParser::new(Some(60.0));
        let events = feed(
            &mut parser,
            &[
                "",
                "no equals sign here",
                "frame=not-a-number",
                "out_time=banana",
                "= =",
            ],
        );
        assert!(events.is_empty());
    }

    #[test]
    fn interleaved_malformed_lines_do_not_break_blocks() {
        let mut parser = ProgressParser::new(Some(100.0));
        let events = feed(
            &mut parser,
            &[
                "out_time=00:00:05.000000",
                "garbage garbage",
                "progress=continue",
                "[mp4 @ 0x55] some libav noise",
                "out_time=00:00:10.000000",
                "progress=continue",
            ],
        );
        assert_eq!(events.len(), 2);
        assert!((events[0].out_time_secs - 5.0).abs() < 0.001);
        assert!((events[1].out_time_secs - 10.0).abs() < 0.001);
    }

    #[test]
    fn not_available_fields_are_none() {
        let mut parser = ProgressParser::new(None);
        let events = feed(
            &mut parser,
            &["fps=N/A", "bitrate=N/A", "speed=N/A", "progress=continue"],
        );
        assert_eq!(events.len(), 1);
        assert!(events[0].fps.is_none());
        assert!(events[0].bitrate_kbps.is_none());
        assert!(events[0].speed.is_none());
    }

    // -- monotonicity ---------------------------------------------------------

    #[test]
    fn out_time_never_regresses() {
        let mut parser = ProgressParser::new(None);
        let events = feed(
            &mut parser,
            &[
                "out_time=00:00:10.000000",
                "progress=continue",
                "out_time=00:00:04.000000",
                "progress=continue",
                "progress=continue",
            ],
        );
        assert_eq!(events.len(), 3);
        assert!((events[0].out_time_secs - 10.0).abs() < 0.001);
        assert!((events[1].out_time_secs - 10.0).abs() < 0.001);
        assert!((events[2].out_time_secs - 10.0).abs() < 0.001);
    }

    // -- out_time_ms quirk ----------------------------------------------------

    #[test]
    fn out_time_ms_is_parsed_as_microseconds() {
        let mut parser = ProgressParser::new(None);
        let events = feed(&mut parser, &["out_time_ms=2500000", "progress=continue"]);
        assert!((events[0].out_time_secs - 2.5).abs() < 0.001);
    }

    // -- completion_percent ---------------------------------------------------

    #[test]
    fn percent_known_total() {
        let pct = completion_percent(30.0, Some(120.0)).unwrap();
        assert!((pct - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn percent_unknown_total() {
        assert!(completion_percent(30.0, None).is_none());
        assert!(completion_percent(30.0, Some(0.0)).is_none());
    }

    #[test]
    fn percent_capped_at_100() {
        let pct = completion_percent(200.0, Some(100.0)).unwrap();
        assert!((pct - 100.0).abs() < f64::EPSILON);
    }
}

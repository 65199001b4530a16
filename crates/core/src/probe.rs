//! Probe-output parsing.
//!
//! The engine runs a probe step once per job to learn the media's total
//! duration (for progress percentages). The probe tool emits JSON
//! (`-print_format json -show_format -show_streams`); these are the
//! structures and helpers that turn it into numbers. The probe *call* lives
//! in the engine — this module stays pure.

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Probe JSON structures
// ---------------------------------------------------------------------------

/// Top-level probe JSON output.
#[derive(Debug, Deserialize)]
pub struct ProbeReport {
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
    pub format: ProbeFormat,
}

/// A single stream from the probe output.
#[derive(Debug, Deserialize)]
pub struct ProbeStream {
    pub index: i32,
    pub codec_name: Option<String>,
    pub codec_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    /// e.g. "30/1" or "24000/1001"
    pub r_frame_rate: Option<String>,
    pub duration: Option<String>,
    pub nb_frames: Option<String>,
}

/// Format-level metadata from the probe output.
#[derive(Debug, Deserialize)]
pub struct ProbeFormat {
    pub duration: Option<String>,
    pub size: Option<String>,
    pub format_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Find the first video stream in the report.
fn first_video_stream(report: &ProbeReport) -> Option<&ProbeStream> {
    report
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
}

/// Total duration in seconds, or `None` when the container does not know.
///
/// Format-level duration is preferred; the first video stream's duration is
/// the fallback (some containers only carry it per-stream).
pub fn parse_duration(report: &ProbeReport) -> Option<f64> {
    if let Some(d) = &report.format.duration {
        if let Ok(secs) = d.parse::<f64>() {
            return Some(secs);
        }
    }
    first_video_stream(report)
        .and_then(|s| s.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
}

/// Video frame rate, or 0.0 when no video stream is present.
///
/// The `r_frame_rate` field is a fraction like `"30/1"` or `"24000/1001"`.
pub fn parse_framerate(report: &ProbeReport) -> f64 {
    first_video_stream(report)
        .and_then(|s| s.r_frame_rate.as_deref())
        .map(parse_fraction)
        .unwrap_or(0.0)
}

/// Parse a fraction string like `"30/1"` into a float.
pub fn parse_fraction(s: &str) -> f64 {
    if let Some((num, den)) = s.split_once('/') {
        let num = num.parse::<f64>().unwrap_or(0.0);
        let den = den.parse::<f64>().unwrap_or(1.0);
        if den > 0.0 {
            return num / den;
        }
        return 0.0;
    }
    s.parse::<f64>().unwrap_or(0.0)
}

/// Total frame count: explicit `nb_frames` when present, otherwise estimated
/// from duration × frame rate, otherwise 0.
pub fn parse_total_frames(report: &ProbeReport) -> i64 {
    if let Some(n) = first_video_stream(report)
        .and_then(|s| s.nb_frames.as_deref())
        .and_then(|n| n.parse::<i64>().ok())
    {
        return n;
    }
    let duration = parse_duration(report).unwrap_or(0.0);
    let fps = parse_framerate(report);
    if duration > 0.0 && fps > 0.0 {
        return (duration * fps).round() as i64;
    }
    0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn video_stream() -> ProbeStream {
        ProbeStream {
            index: 0,
            codec_name: Some("h264".into()),
            codec_type: Some("video".into()),
            width: Some(1920),
            height: Some(1080),
            r_frame_rate: Some("30/1".into()),
            duration: None,
            nb_frames: None,
        }
    }

    fn report(streams: Vec<ProbeStream>, format_duration: Option<&str>) -> ProbeReport {
        ProbeReport {
            streams,
            format: ProbeFormat {
                duration: format_duration.map(str::to_string),
                size: None,
                format_name: None,
            },
        }
    }

    // -- parse_fraction -------------------------------------------------------

    #[test]
    fn fraction_standard() {
        assert!((parse_fraction("30/1") - 30.0).abs() < 0.001);
    }

    #[test]
    fn fraction_ntsc() {
        assert!((parse_fraction("24000/1001") - 23.976).abs() < 0.01);
    }

    #[test]
    fn fraction_plain_number() {
        assert!((parse_fraction("25") - 25.0).abs() < 0.001);
    }

    #[test]
    fn fraction_zero_denominator() {
        assert!((parse_fraction("30/0") - 0.0).abs() < 0.001);
    }

    // -- parse_duration -------------------------------------------------------

    #[test]
    fn duration_from_format() {
        let r = report(vec![], Some("120.5"));
        assert!((parse_duration(&r).unwrap() - 120.5).abs() < 0.001);
    }

    #[test]
    fn duration_falls_back_to_stream() {
        let mut stream = video_stream();
        stream.duration = Some("60.0".into());
        let r = report(vec![stream], None);
        assert!((parse_duration(&r).unwrap() - 60.0).abs() < 0.001);
    }

    #[test]
    fn duration_unknown() {
        let r = report(vec![video_stream()], None);
        assert!(parse_duration(&r).is_none());
    }

    // -- parse_framerate ------------------------------------------------------

    #[test]
    fn framerate_from_video_stream() {
        let mut stream = video_stream();
        stream.r_frame_rate = Some("24000/1001".into());
        let r = report(vec![stream], None);
        assert!((parse_framerate(&r) - 23.976).abs() < 0.01);
    }

    #[test]
    fn framerate_zero_without_video_stream() {
        let r = report(vec![], Some("10.0"));
        assert!((parse_framerate(&r) - 0.0).abs() < f64::EPSILON);
    }

    // -- parse_total_frames ---------------------------------------------------

    #[test]
    fn total_frames_from_nb_frames() {
        let mut stream = video_stream();
        stream.nb_frames = Some("300".into());
        let r = report(vec![stream], Some("10.0"));
        assert_eq!(parse_total_frames(&r), 300);
    }

    #[test]
    fn total_frames_estimated() {
        let r = report(vec![video_stream()], Some("10.0"));
        assert_eq!(parse_total_frames(&r), 300);
    }

    // -- JSON deserialization -------------------------------------------------

    #[test]
    fn report_parses_from_json() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_name": "h264", "codec_type": "video",
                 "width": 1280, "height": 720, "r_frame_rate": "30/1",
                 "duration": "9.5", "nb_frames": "285"}
            ],
            "format": {"duration": "9.6", "size": "1048576", "format_name": "mov,mp4"}
        }"#;
        let report: ProbeReport = serde_json::from_str(json).unwrap();
        assert!((parse_duration(&report).unwrap() - 9.6).abs() < 0.001);
        assert_eq!(parse_total_frames(&report), 285);
    }
}

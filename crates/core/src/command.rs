//! Typed command construction for the wrapped media binary.
//!
//! [`CommandBuilder`] turns input/output specs into a validated, fully
//! resolved argv array. Validation happens entirely at build time, before a
//! queue slot or process is consumed. The builder never produces a shell
//! string — arguments are always a plain argv vector, so there is no escaping
//! logic and no injection surface to begin with.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::preset;

// ---------------------------------------------------------------------------
// Allow-lists
// ---------------------------------------------------------------------------

/// Video codec identifiers accepted by the builder.
pub const VIDEO_CODECS: &[&str] = &[
    "libx264",
    "libx265",
    "libvpx-vp9",
    "libaom-av1",
    "h264_nvenc",
    "hevc_nvenc",
    "copy",
];

/// Audio codec identifiers accepted by the builder.
pub const AUDIO_CODECS: &[&str] = &[
    "aac",
    "libopus",
    "libmp3lame",
    "flac",
    "pcm_s16le",
    "copy",
];

/// Container/format identifiers accepted for inputs and outputs.
pub const CONTAINERS: &[&str] = &[
    "mp4", "matroska", "webm", "mov", "mpegts", "wav", "mp3", "flac", "ogg",
];

/// Codec families that require even frame dimensions (4:2:0 chroma).
const EVEN_DIMENSION_CODECS: &[&str] = &["libx264", "libx265", "h264_nvenc", "hevc_nvenc"];

/// The pseudo-path that routes a stream over stdin/stdout instead of a file.
pub const PIPE_PATH: &str = "-";

// ---------------------------------------------------------------------------
// Specs
// ---------------------------------------------------------------------------

/// Stdin/stdout redirection mode declared by a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdioMode {
    /// The stream is not used; data travels via file paths in the argv.
    #[default]
    File,
    /// The child inherits the parent's handle.
    Inherit,
    /// The stream is piped to/from the caller (streaming jobs).
    Piped,
}

/// One input source for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSpec {
    /// File path, or [`PIPE_PATH`] to read from stdin.
    pub path: String,
    /// Optional demuxer/container hint, checked against [`CONTAINERS`].
    pub format: Option<String>,
    /// Optional seek offset in seconds, applied before decoding.
    pub seek_secs: Option<f64>,
}

impl InputSpec {
    /// Input read from a file path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            format: None,
            seek_secs: None,
        }
    }

    /// Input streamed over stdin.
    pub fn piped() -> Self {
        Self::new(PIPE_PATH)
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_seek(mut self, secs: f64) -> Self {
        self.seek_secs = Some(secs);
        self
    }
}

/// One output target for a job.
///
/// Unset fields are left to the binary's defaults, or filled in from a named
/// preset (see [`crate::preset::apply_preset`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSpec {
    /// File path, or [`PIPE_PATH`] to write to stdout.
    pub path: String,
    /// Output container, checked against [`CONTAINERS`].
    pub container: Option<String>,
    /// Video codec, checked against [`VIDEO_CODECS`].
    pub video_codec: Option<String>,
    /// Audio codec, checked against [`AUDIO_CODECS`].
    pub audio_codec: Option<String>,
    /// Video bitrate in kbit/s.
    pub video_bitrate_kbps: Option<u32>,
    /// Audio bitrate in kbit/s.
    pub audio_bitrate_kbps: Option<u32>,
    /// Output frame width in pixels. Must be set together with `height`.
    pub width: Option<i32>,
    /// Output frame height in pixels. Must be set together with `width`.
    pub height: Option<i32>,
    /// Output frame rate.
    pub frame_rate: Option<f64>,
    /// Cap the encoded duration to this many seconds.
    pub duration_cap_secs: Option<f64>,
}

impl OutputSpec {
    /// Output written to a file path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Output streamed over stdout.
    pub fn piped() -> Self {
        Self::new(PIPE_PATH)
    }
}

/// Options applied to the invocation as a whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalOptions {
    /// Overwrite existing output files (`-y`).
    pub overwrite: bool,
    /// Log level passed to the binary (`-loglevel`).
    pub log_level: String,
    /// Extra environment variables set for the child process.
    pub env: Vec<(String, String)>,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            log_level: "error".to_string(),
            env: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// A validated, fully resolved invocation: program, argv, stdio wiring, env.
///
/// Produced once by [`CommandBuilder::build`] and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    program: String,
    args: Vec<String>,
    stdin: StdioMode,
    stdout: StdioMode,
    env: Vec<(String, String)>,
}

impl Command {
    /// Assemble a command from pre-validated parts.
    ///
    /// For callers that already hold a known-good argv (and for the engine's
    /// own tests). Normal job submission goes through [`CommandBuilder`].
    pub fn from_parts(
        program: impl Into<String>,
        args: Vec<String>,
        stdin: StdioMode,
        stdout: StdioMode,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            stdin,
            stdout,
            env: Vec::new(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn stdin_mode(&self) -> StdioMode {
        self.stdin
    }

    pub fn stdout_mode(&self) -> StdioMode {
        self.stdout
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles and validates a [`Command`] from typed specs.
#[derive(Debug, Clone, Default)]
pub struct CommandBuilder {
    program: Option<String>,
    inputs: Vec<InputSpec>,
    outputs: Vec<OutputSpec>,
    global: GlobalOptions,
    preset: Option<String>,
    stdin_override: Option<StdioMode>,
    stdout_override: Option<StdioMode>,
}

impl CommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the program name (defaults to `"ffmpeg"`).
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn add_input(mut self, spec: InputSpec) -> Self {
        self.inputs.push(spec);
        self
    }

    pub fn add_output(mut self, spec: OutputSpec) -> Self {
        self.outputs.push(spec);
        self
    }

    pub fn global_options(mut self, opts: GlobalOptions) -> Self {
        self.global = opts;
        self
    }

    /// Apply a named preset to every output before validation.
    pub fn preset(mut self, name: impl Into<String>) -> Self {
        self.preset = Some(name.into());
        self
    }

    /// Force a stdin redirection mode instead of deriving it from the specs.
    pub fn stdin_mode(mut self, mode: StdioMode) -> Self {
        self.stdin_override = Some(mode);
        self
    }

    /// Force a stdout redirection mode instead of deriving it from the specs.
    pub fn stdout_mode(mut self, mode: StdioMode) -> Self {
        self.stdout_override = Some(mode);
        self
    }

    /// Validate the specs and produce the final [`Command`].
    ///
    /// Fails fast with a field-addressable [`ValidationError`]; no filesystem
    /// or process resource is touched. Input-file existence is deliberately
    /// not checked here — that is deferred to spawn time so the builder stays
    /// pure and synchronous.
    pub fn build(mut self) -> Result<Command, ValidationError> {
        if self.inputs.is_empty() {
            return Err(ValidationError::new(
                "inputs",
                "at least one input is required",
            ));
        }
        if self.outputs.is_empty() {
            return Err(ValidationError::new(
                "outputs",
                "at least one output is required",
            ));
        }

        if let Some(name) = &self.preset {
            let spec = preset::find_preset(name).ok_or_else(|| {
                ValidationError::new(
                    "preset",
                    format!("unknown preset '{name}'. Valid presets: {}", preset::preset_names().join(", ")),
                )
            })?;
            for output in &mut self.outputs {
                preset::apply_preset(output, spec);
            }
        }

        for (i, input) in self.inputs.iter().enumerate() {
            validate_input(i, input)?;
        }
        for (i, output) in self.outputs.iter().enumerate() {
            validate_output(i, output)?;
        }

        let stdin = self.stdin_override.unwrap_or_else(|| {
            if self.inputs.iter().any(|s| s.path == PIPE_PATH) {
                StdioMode::Piped
            } else {
                StdioMode::File
            }
        });
        let stdout = self.stdout_override.unwrap_or_else(|| {
            if self.outputs.iter().any(|s| s.path == PIPE_PATH) {
                StdioMode::Piped
            } else {
                StdioMode::File
            }
        });

        Ok(Command {
            program: self.program.unwrap_or_else(|| "ffmpeg".to_string()),
            args: assemble_args(&self.inputs, &self.outputs, &self.global),
            stdin,
            stdout,
            env: self.global.env.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_input(index: usize, input: &InputSpec) -> Result<(), ValidationError> {
    if input.path.is_empty() {
        return Err(ValidationError::new(
            format!("inputs[{index}].path"),
            "must not be empty",
        ));
    }
    if let Some(format) = &input.format {
        if !CONTAINERS.contains(&format.as_str()) {
            return Err(ValidationError::new(
                format!("inputs[{index}].format"),
                format!("unknown format '{format}'. Valid formats: {}", CONTAINERS.join(", ")),
            ));
        }
    }
    if let Some(seek) = input.seek_secs {
        if !seek.is_finite() || seek < 0.0 {
            return Err(ValidationError::new(
                format!("inputs[{index}].seek_secs"),
                "must be a non-negative number of seconds",
            ));
        }
    }
    Ok(())
}

fn validate_output(index: usize, output: &OutputSpec) -> Result<(), ValidationError> {
    let field = |name: &str| format!("outputs[{index}].{name}");

    if output.path.is_empty() {
        return Err(ValidationError::new(field("path"), "must not be empty"));
    }

    if let Some(codec) = &output.video_codec {
        if !VIDEO_CODECS.contains(&codec.as_str()) {
            return Err(ValidationError::new(
                field("video_codec"),
                format!("unknown codec '{codec}'. Valid codecs: {}", VIDEO_CODECS.join(", ")),
            ));
        }
    }
    if let Some(codec) = &output.audio_codec {
        if !AUDIO_CODECS.contains(&codec.as_str()) {
            return Err(ValidationError::new(
                field("audio_codec"),
                format!("unknown codec '{codec}'. Valid codecs: {}", AUDIO_CODECS.join(", ")),
            ));
        }
    }
    if let Some(container) = &output.container {
        if !CONTAINERS.contains(&container.as_str()) {
            return Err(ValidationError::new(
                field("container"),
                format!("unknown container '{container}'. Valid containers: {}", CONTAINERS.join(", ")),
            ));
        }
    }

    if output.video_bitrate_kbps == Some(0) {
        return Err(ValidationError::new(
            field("video_bitrate_kbps"),
            "must be greater than 0",
        ));
    }
    if output.audio_bitrate_kbps == Some(0) {
        return Err(ValidationError::new(
            field("audio_bitrate_kbps"),
            "must be greater than 0",
        ));
    }

    match (output.width, output.height) {
        (None, None) => {}
        (Some(w), Some(h)) => {
            if w <= 0 || h <= 0 {
                return Err(ValidationError::new(
                    field("width"),
                    format!("dimensions must be greater than 0 (got {w}x{h})"),
                ));
            }
            let needs_even = output
                .video_codec
                .as_deref()
                .is_some_and(|c| EVEN_DIMENSION_CODECS.contains(&c));
            if needs_even && (w % 2 != 0 || h % 2 != 0) {
                return Err(ValidationError::new(
                    field("width"),
                    format!(
                        "codec '{}' requires even dimensions (got {w}x{h})",
                        output.video_codec.as_deref().unwrap_or_default()
                    ),
                ));
            }
        }
        _ => {
            return Err(ValidationError::new(
                field("width"),
                "width and height must be specified together",
            ));
        }
    }

    if let Some(rate) = output.frame_rate {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ValidationError::new(
                field("frame_rate"),
                "must be greater than 0",
            ));
        }
    }
    if let Some(cap) = output.duration_cap_secs {
        if !cap.is_finite() || cap <= 0.0 {
            return Err(ValidationError::new(
                field("duration_cap_secs"),
                "must be greater than 0",
            ));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Argv assembly
// ---------------------------------------------------------------------------

/// Build the final argv. Each value is its own argv element; paths are never
/// concatenated into a command line.
fn assemble_args(
    inputs: &[InputSpec],
    outputs: &[OutputSpec],
    global: &GlobalOptions,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        global.log_level.clone(),
        "-nostats".into(),
        // Machine-readable key=value progress on stderr, one report per
        // interval, terminated by a `progress=` line.
        "-progress".into(),
        "pipe:2".into(),
    ];
    if global.overwrite {
        args.push("-y".into());
    }

    for input in inputs {
        if let Some(seek) = input.seek_secs {
            args.push("-ss".into());
            args.push(format_secs(seek));
        }
        if let Some(format) = &input.format {
            args.push("-f".into());
            args.push(format.clone());
        }
        args.push("-i".into());
        args.push(input.path.clone());
    }

    for output in outputs {
        if let Some(codec) = &output.video_codec {
            args.push("-c:v".into());
            args.push(codec.clone());
        }
        if let Some(kbps) = output.video_bitrate_kbps {
            args.push("-b:v".into());
            args.push(format!("{kbps}k"));
        }
        if let (Some(w), Some(h)) = (output.width, output.height) {
            args.push("-s".into());
            args.push(format!("{w}x{h}"));
        }
        if let Some(rate) = output.frame_rate {
            args.push("-r".into());
            args.push(format_frame_rate(rate));
        }
        if let Some(codec) = &output.audio_codec {
            args.push("-c:a".into());
            args.push(codec.clone());
        }
        if let Some(kbps) = output.audio_bitrate_kbps {
            args.push("-b:a".into());
            args.push(format!("{kbps}k"));
        }
        if let Some(cap) = output.duration_cap_secs {
            args.push("-t".into());
            args.push(format_secs(cap));
        }
        if let Some(container) = &output.container {
            args.push("-f".into());
            args.push(container.clone());
        }
        args.push(output.path.clone());
    }

    args
}

/// Format a seconds value without a trailing zero tail (`12.5`, not `12.500`).
fn format_secs(secs: f64) -> String {
    if secs.fract() == 0.0 {
        format!("{}", secs as i64)
    } else {
        format!("{secs:.3}")
    }
}

/// Frame rates are commonly integral; keep `30` as `30`, not `30.000`.
fn format_frame_rate(rate: f64) -> String {
    format_secs(rate)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_builder() -> CommandBuilder {
        CommandBuilder::new()
            .add_input(InputSpec::new("/media/in.mp4"))
            .add_output(OutputSpec::new("/media/out.mp4"))
    }

    // -- required specs -------------------------------------------------------

    #[test]
    fn build_requires_an_input() {
        let err = CommandBuilder::new()
            .add_output(OutputSpec::new("/media/out.mp4"))
            .build()
            .unwrap_err();
        assert_eq!(err.field, "inputs");
    }

    #[test]
    fn build_requires_an_output() {
        let err = CommandBuilder::new()
            .add_input(InputSpec::new("/media/in.mp4"))
            .build()
            .unwrap_err();
        assert_eq!(err.field, "outputs");
    }

    #[test]
    fn minimal_build_succeeds() {
        let cmd = minimal_builder().build().unwrap();
        assert_eq!(cmd.program(), "ffmpeg");
        assert_eq!(cmd.stdin_mode(), StdioMode::File);
        assert_eq!(cmd.stdout_mode(), StdioMode::File);
    }

    // -- allow-lists ----------------------------------------------------------

    #[test]
    fn unknown_video_codec_rejected() {
        let mut out = OutputSpec::new("/media/out.mp4");
        out.video_codec = Some("totally-real-codec".into());
        let err = CommandBuilder::new()
            .add_input(InputSpec::new("/media/in.mp4"))
            .add_output(out)
            .build()
            .unwrap_err();
        assert_eq!(err.field, "outputs[0].video_codec");
    }

    #[test]
    fn unknown_audio_codec_rejected() {
        let mut out = OutputSpec::new("/media/out.mp4");
        out.audio_codec = Some("mp5".into());
        let err = minimal_builder().add_output(out).build().unwrap_err();
        assert_eq!(err.field, "outputs[1].audio_codec");
    }

    #[test]
    fn unknown_container_rejected() {
        let mut out = OutputSpec::new("/media/out.xyz");
        out.container = Some("xyz".into());
        let err = CommandBuilder::new()
            .add_input(InputSpec::new("/media/in.mp4"))
            .add_output(out)
            .build()
            .unwrap_err();
        assert_eq!(err.field, "outputs[0].container");
    }

    #[test]
    fn unknown_input_format_rejected() {
        let err = CommandBuilder::new()
            .add_input(InputSpec::new("/media/in.raw").with_format("rawvideo2"))
            .add_output(OutputSpec::new("/media/out.mp4"))
            .build()
            .unwrap_err();
        assert_eq!(err.field, "inputs[0].format");
    }

    // -- numeric validation ---------------------------------------------------

    #[test]
    fn zero_bitrate_rejected() {
        let mut out = OutputSpec::new("/media/out.mp4");
        out.video_bitrate_kbps = Some(0);
        let err = CommandBuilder::new()
            .add_input(InputSpec::new("/media/in.mp4"))
            .add_output(out)
            .build()
            .unwrap_err();
        assert_eq!(err.field, "outputs[0].video_bitrate_kbps");
    }

    #[test]
    fn negative_seek_rejected() {
        let err = CommandBuilder::new()
            .add_input(InputSpec::new("/media/in.mp4").with_seek(-1.0))
            .add_output(OutputSpec::new("/media/out.mp4"))
            .build()
            .unwrap_err();
        assert_eq!(err.field, "inputs[0].seek_secs");
    }

    #[test]
    fn negative_dimensions_rejected() {
        let mut out = OutputSpec::new("/media/out.mp4");
        out.width = Some(-1280);
        out.height = Some(720);
        let err = CommandBuilder::new()
            .add_input(InputSpec::new("/media/in.mp4"))
            .add_output(out)
            .build()
            .unwrap_err();
        assert_eq!(err.field, "outputs[0].width");
    }

    #[test]
    fn width_without_height_rejected() {
        let mut out = OutputSpec::new("/media/out.mp4");
        out.width = Some(1280);
        let err = CommandBuilder::new()
            .add_input(InputSpec::new("/media/in.mp4"))
            .add_output(out)
            .build()
            .unwrap_err();
        assert!(err.reason.contains("together"));
    }

    #[test]
    fn zero_frame_rate_rejected() {
        let mut out = OutputSpec::new("/media/out.mp4");
        out.frame_rate = Some(0.0);
        let err = CommandBuilder::new()
            .add_input(InputSpec::new("/media/in.mp4"))
            .add_output(out)
            .build()
            .unwrap_err();
        assert_eq!(err.field, "outputs[0].frame_rate");
    }

    // -- even-dimension rule --------------------------------------------------

    #[test]
    fn odd_dimensions_rejected_for_h264() {
        let mut out = OutputSpec::new("/media/out.mp4");
        out.video_codec = Some("libx264".into());
        out.width = Some(1281);
        out.height = Some(720);
        let err = CommandBuilder::new()
            .add_input(InputSpec::new("/media/in.mp4"))
            .add_output(out)
            .build()
            .unwrap_err();
        assert!(err.reason.contains("even dimensions"));
    }

    #[test]
    fn odd_dimensions_allowed_for_vp9() {
        let mut out = OutputSpec::new("/media/out.webm");
        out.video_codec = Some("libvpx-vp9".into());
        out.width = Some(1281);
        out.height = Some(721);
        assert!(CommandBuilder::new()
            .add_input(InputSpec::new("/media/in.mp4"))
            .add_output(out)
            .build()
            .is_ok());
    }

    // -- presets --------------------------------------------------------------

    #[test]
    fn unknown_preset_rejected() {
        let err = minimal_builder().preset("does-not-exist").build().unwrap_err();
        assert_eq!(err.field, "preset");
    }

    #[test]
    fn preset_fills_output_fields() {
        let cmd = minimal_builder().preset(preset::PRESET_SOCIAL_720P).build().unwrap();
        let args = cmd.args().join(" ");
        assert!(args.contains("-c:v libx264"));
        assert!(args.contains("-s 1280x720"));
    }

    // -- argv assembly --------------------------------------------------------

    #[test]
    fn argv_orders_input_flags_before_path() {
        let cmd = CommandBuilder::new()
            .add_input(InputSpec::new("/media/in.mkv").with_format("matroska").with_seek(12.5))
            .add_output(OutputSpec::new("/media/out.mp4"))
            .build()
            .unwrap();
        let args = cmd.args();
        let i = args.iter().position(|a| a == "-ss").unwrap();
        assert_eq!(args[i + 1], "12.500");
        assert_eq!(args[i + 2], "-f");
        assert_eq!(args[i + 3], "matroska");
        assert_eq!(args[i + 4], "-i");
        assert_eq!(args[i + 5], "/media/in.mkv");
    }

    #[test]
    fn argv_includes_progress_stream_flags() {
        let cmd = minimal_builder().build().unwrap();
        let args = cmd.args().join(" ");
        assert!(args.contains("-progress pipe:2"));
        assert!(args.contains("-nostats"));
        assert!(args.contains("-hide_banner"));
    }

    #[test]
    fn overwrite_flag_follows_global_options() {
        let cmd = minimal_builder()
            .global_options(GlobalOptions {
                overwrite: false,
                ..Default::default()
            })
            .build()
            .unwrap();
        assert!(!cmd.args().iter().any(|a| a == "-y"));
    }

    #[test]
    fn paths_are_single_argv_elements() {
        // A hostile path stays a single argv element — nothing to escape,
        // nothing to inject.
        let hostile = "/media/in; rm -rf $HOME.mp4";
        let cmd = CommandBuilder::new()
            .add_input(InputSpec::new(hostile))
            .add_output(OutputSpec::new("/media/out.mp4"))
            .build()
            .unwrap();
        assert!(cmd.args().iter().any(|a| a == hostile));
    }

    // -- stdio modes ----------------------------------------------------------

    #[test]
    fn pipe_paths_derive_stdio_modes() {
        let cmd = CommandBuilder::new()
            .add_input(InputSpec::piped().with_format("mpegts"))
            .add_output(OutputSpec::piped())
            .stdout_mode(StdioMode::Piped)
            .build()
            .unwrap();
        assert_eq!(cmd.stdin_mode(), StdioMode::Piped);
        assert_eq!(cmd.stdout_mode(), StdioMode::Piped);
    }

    #[test]
    fn explicit_stdio_override_wins() {
        let cmd = minimal_builder().stdin_mode(StdioMode::Inherit).build().unwrap();
        assert_eq!(cmd.stdin_mode(), StdioMode::Inherit);
    }

    #[test]
    fn from_parts_round_trips() {
        let cmd = Command::from_parts(
            "sh",
            vec!["-c".into(), "exit 0".into()],
            StdioMode::File,
            StdioMode::File,
        );
        assert_eq!(cmd.program(), "sh");
        assert_eq!(cmd.args(), ["-c", "exit 0"]);
    }
}

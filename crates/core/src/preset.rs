//! Named encode presets.
//!
//! A preset is a bundle of output defaults a caller can reference by name
//! instead of spelling out codecs and bitrates. Presets only fill fields the
//! caller left unset — explicit values always win.

use crate::command::OutputSpec;
use crate::error::ValidationError;

/* --------------------------------------------------------------------------
   Preset names
   -------------------------------------------------------------------------- */

/// Low-resolution proxy for quick review.
pub const PRESET_PREVIEW_480P: &str = "preview-480p";

/// 720p H.264 suitable for social delivery.
pub const PRESET_SOCIAL_720P: &str = "social-720p";

/// 1080p H.264 general-purpose delivery.
pub const PRESET_HD_1080P: &str = "hd-1080p";

/// 1080p H.265 archival encode.
pub const PRESET_ARCHIVE_1080P: &str = "archive-1080p";

/// Audio-only Opus extraction.
pub const PRESET_AUDIO_OPUS: &str = "audio-opus";

/* --------------------------------------------------------------------------
   Preset table
   -------------------------------------------------------------------------- */

/// Output defaults bundled under a preset name.
#[derive(Debug, Clone, Copy)]
pub struct PresetSpec {
    pub name: &'static str,
    pub video_codec: Option<&'static str>,
    pub audio_codec: Option<&'static str>,
    pub video_bitrate_kbps: Option<u32>,
    pub audio_bitrate_kbps: Option<u32>,
    pub dimensions: Option<(i32, i32)>,
}

/// All built-in presets, keyed by [`PresetSpec::name`].
pub const PRESETS: &[PresetSpec] = &[
    PresetSpec {
        name: PRESET_PREVIEW_480P,
        video_codec: Some("libx264"),
        audio_codec: Some("aac"),
        video_bitrate_kbps: Some(1_000),
        audio_bitrate_kbps: Some(96),
        dimensions: Some((854, 480)),
    },
    PresetSpec {
        name: PRESET_SOCIAL_720P,
        video_codec: Some("libx264"),
        audio_codec: Some("aac"),
        video_bitrate_kbps: Some(2_500),
        audio_bitrate_kbps: Some(128),
        dimensions: Some((1280, 720)),
    },
    PresetSpec {
        name: PRESET_HD_1080P,
        video_codec: Some("libx264"),
        audio_codec: Some("aac"),
        video_bitrate_kbps: Some(5_000),
        audio_bitrate_kbps: Some(192),
        dimensions: Some((1920, 1080)),
    },
    PresetSpec {
        name: PRESET_ARCHIVE_1080P,
        video_codec: Some("libx265"),
        audio_codec: Some("flac"),
        video_bitrate_kbps: Some(3_500),
        audio_bitrate_kbps: None,
        dimensions: Some((1920, 1080)),
    },
    PresetSpec {
        name: PRESET_AUDIO_OPUS,
        video_codec: None,
        audio_codec: Some("libopus"),
        video_bitrate_kbps: None,
        audio_bitrate_kbps: Some(160),
        dimensions: None,
    },
];

/* --------------------------------------------------------------------------
   Lookup and application
   -------------------------------------------------------------------------- */

/// Look up a preset by name.
pub fn find_preset(name: &str) -> Option<&'static PresetSpec> {
    PRESETS.iter().find(|p| p.name == name)
}

/// All valid preset names, for error messages.
pub fn preset_names() -> Vec<&'static str> {
    PRESETS.iter().map(|p| p.name).collect()
}

/// Validate that `name` refers to a known preset.
pub fn validate_preset_name(name: &str) -> Result<(), ValidationError> {
    if find_preset(name).is_some() {
        Ok(())
    } else {
        Err(ValidationError::new(
            "preset",
            format!(
                "unknown preset '{name}'. Valid presets: {}",
                preset_names().join(", ")
            ),
        ))
    }
}

/// Fill unset fields of `output` from `preset`. Fields the caller already
/// set are left untouched.
pub fn apply_preset(output: &mut OutputSpec, preset: &PresetSpec) {
    if output.video_codec.is_none() {
        output.video_codec = preset.video_codec.map(str::to_string);
    }
    if output.audio_codec.is_none() {
        output.audio_codec = preset.audio_codec.map(str::to_string);
    }
    if output.video_bitrate_kbps.is_none() {
        output.video_bitrate_kbps = preset.video_bitrate_kbps;
    }
    if output.audio_bitrate_kbps.is_none() {
        output.audio_bitrate_kbps = preset.audio_bitrate_kbps;
    }
    if output.width.is_none() && output.height.is_none() {
        if let Some((w, h)) = preset.dimensions {
            output.width = Some(w);
            output.height = Some(h);
        }
    }
}

/* --------------------------------------------------------------------------
   Tests
   -------------------------------------------------------------------------- */

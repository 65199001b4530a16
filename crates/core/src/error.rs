//! Field-addressable validation errors.

/// A validation failure tied to a specific field of a job specification.
///
/// `field` uses dotted/indexed paths (`"outputs[0].video_codec"`) so callers
/// can surface precise feedback without parsing the message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {field}: {reason}")]
pub struct ValidationError {
    /// Path of the offending field, e.g. `"inputs[1].seek_secs"`.
    pub field: String,
    /// Human-readable explanation of the failure.
    pub reason: String,
}

impl ValidationError {
    /// Create a validation error for `field`.
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_field_and_reason() {
        let err = ValidationError::new("outputs[0].width", "must be positive");
        assert_eq!(err.to_string(), "Invalid outputs[0].width: must be positive");
    }
}

//! Error types for Stompkick

use thiserror::Error;

/// Errors that can occur while decoding, configuring or driving a detector.
///
/// Insufficient data and ambiguous classifications are not errors; the
/// detector reports those as "no decision" (`None`).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Malformed packet: expected at least {expected} bytes, got {actual}")]
    MalformedPacket { expected: usize, actual: usize },

    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error for '{field}': {message}")]
    Configuration { field: String, message: String },

    #[error("Calibration timed out after {waited_secs:.1}s ({buffered}/{capacity} samples buffered)")]
    CalibrationTimeout {
        waited_secs: f64,
        buffered: usize,
        capacity: usize,
    },

    #[error("Event sink error: {0}")]
    Sink(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create a configuration error for a named field
    pub fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }
}

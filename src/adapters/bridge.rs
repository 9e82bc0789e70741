//! Bridge JSON adapter
//!
//! The BLE bridge forwards each decoded notification as a JSON object:
//!
//! ```json
//! {"acceleration": {"x": 0.01, "y": -0.02, "z": 0.98},
//!  "gyro": {"x": 0.5, "y": -1.2, "z": 0.0},
//!  "raw": "55-55-01-..."}
//! ```
//!
//! `timestamp` is optional; when it is missing the caller's clock is used.

use serde::{Deserialize, Serialize};

use super::{hex_dashed, SampleAdapter};
use crate::error::EngineError;
use crate::types::{Sample, Vector3};

/// Wire form of one bridge sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeSample {
    pub acceleration: Vector3,
    pub gyro: Vector3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl BridgeSample {
    /// Build the wire form of a decoded sample, optionally keeping the raw packet
    pub fn from_sample(sample: &Sample, raw: Option<&[u8]>) -> Self {
        Self {
            acceleration: sample.accel,
            gyro: sample.gyro,
            raw: raw.map(hex_dashed),
            timestamp: Some(sample.timestamp),
        }
    }

    /// Convert to a sample, preferring the embedded timestamp over `fallback`
    pub fn into_sample(self, fallback: f64) -> Result<Sample, EngineError> {
        let sample = Sample::new(
            self.timestamp.unwrap_or(fallback),
            self.acceleration,
            self.gyro,
        );
        if !sample.is_finite() {
            return Err(EngineError::InvalidSample(
                "bridge sample contains non-finite values".to_string(),
            ));
        }
        Ok(sample)
    }
}

/// Decoder for bridge JSON lines
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeJsonAdapter;

impl BridgeJsonAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Parse a line without resolving its timestamp
    pub fn parse(&self, line: &str) -> Result<BridgeSample, EngineError> {
        Ok(serde_json::from_str(line)?)
    }

    /// Serialize a sample as a single bridge JSON line
    pub fn encode(&self, sample: &Sample, raw: Option<&[u8]>) -> Result<String, EngineError> {
        Ok(serde_json::to_string(&BridgeSample::from_sample(sample, raw))?)
    }
}

impl SampleAdapter for BridgeJsonAdapter {
    type Input = str;

    fn decode(&self, line: &str, timestamp: f64) -> Result<Sample, EngineError> {
        self.parse(line)?.into_sample(timestamp)
    }

    fn name(&self) -> &'static str {
        "bridge-json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_uses_fallback_timestamp() {
        let line = r#"{"acceleration":{"x":0.1,"y":0.2,"z":0.9},"gyro":{"x":1.0,"y":-2.0,"z":3.0},"raw":"55-55"}"#;
        let sample = BridgeJsonAdapter.decode(line, 7.25).unwrap();

        assert_eq!(sample.timestamp, 7.25);
        assert_eq!(sample.accel, Vector3::new(0.1, 0.2, 0.9));
        assert_eq!(sample.gyro, Vector3::new(1.0, -2.0, 3.0));
    }

    #[test]
    fn test_embedded_timestamp_wins() {
        let line = r#"{"acceleration":{"x":0,"y":0,"z":1},"gyro":{"x":0,"y":0,"z":0},"timestamp":3.5}"#;
        let sample = BridgeJsonAdapter.decode(line, 99.0).unwrap();
        assert_eq!(sample.timestamp, 3.5);
    }

    #[test]
    fn test_missing_axis_is_rejected() {
        let line = r#"{"acceleration":{"x":0,"z":1},"gyro":{"x":0,"y":0,"z":0}}"#;
        assert!(matches!(
            BridgeJsonAdapter.decode(line, 0.0),
            Err(EngineError::JsonError(_))
        ));
    }

    #[test]
    fn test_non_finite_fallback_is_rejected() {
        let line = r#"{"acceleration":{"x":0,"y":0,"z":1},"gyro":{"x":0,"y":0,"z":0}}"#;
        assert!(matches!(
            BridgeJsonAdapter.decode(line, f64::NAN),
            Err(EngineError::InvalidSample(_))
        ));
    }

    #[test]
    fn test_encode_keeps_raw_packet() {
        let sample = Sample::new(0.5, Vector3::new(1.0, 0.0, 0.0), Vector3::default());
        let line = BridgeJsonAdapter.encode(&sample, Some(&[0x55, 0x0A])).unwrap();
        let parsed = BridgeJsonAdapter.parse(&line).unwrap();

        assert_eq!(parsed.raw.as_deref(), Some("55-0A"));
        assert_eq!(parsed.timestamp, Some(0.5));
        assert_eq!(parsed.acceleration, sample.accel);
    }
}

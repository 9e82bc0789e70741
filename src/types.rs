//! Core types for the Stompkick engine
//!
//! This module defines the data structures that flow through each stage of the
//! detector: decoded samples, feature vectors, classification results, detection
//! statistics, and the emitted event payload.

use serde::{Deserialize, Serialize};

/// Three-axis reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// One decoded inertial reading.
///
/// Acceleration is in g, angular rate in degrees per second, timestamp in
/// monotonic seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: f64,
    pub accel: Vector3,
    pub gyro: Vector3,
}

impl Sample {
    pub const fn new(timestamp: f64, accel: Vector3, gyro: Vector3) -> Self {
        Self {
            timestamp,
            accel,
            gyro,
        }
    }

    /// True when every field is a finite number
    pub fn is_finite(&self) -> bool {
        self.timestamp.is_finite() && self.accel.is_finite() && self.gyro.is_finite()
    }

    /// Segmentation intensity contribution of this single reading
    pub(crate) fn instantaneous_intensity(&self) -> f64 {
        self.accel.x.abs() + self.accel.z.abs() + self.gyro.y.abs() / 100.0
    }
}

/// Scalar statistics computed over a window or a complete segment
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Population standard deviation of acceleration x (g)
    pub x_std: f64,
    /// Population standard deviation of acceleration z (g)
    pub z_std: f64,
    /// Population standard deviation of gyro y (°/s)
    pub y_gyro_std: f64,
    pub x_range: f64,
    pub z_range: f64,
    pub y_gyro_range: f64,
    /// Seconds between first and last sample
    pub duration: f64,
    pub peak_count_x: u32,
    pub peak_count_z: u32,
    pub max_intensity: f64,
    /// Variance of the second difference of accel x plus that of accel z
    pub transition_sharpness: f64,
    /// Mean over x and z of `1 / (1 + var(first difference))`
    pub motion_smoothness: f64,
}

impl FeatureVector {
    /// Segmentation trigger signal: `x_std + z_std + y_gyro_std / 100`
    pub fn intensity(&self) -> f64 {
        self.x_std + self.z_std + self.y_gyro_std / 100.0
    }
}

/// Gesture classes the detector can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionLabel {
    Stomp,
    Kick,
}

impl MotionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionLabel::Stomp => "stomp",
            MotionLabel::Kick => "kick",
        }
    }
}

/// Per-class scores accumulated by the classifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionScores {
    pub stomp: f64,
    pub kick: f64,
}

impl MotionScores {
    pub fn total(&self) -> f64 {
        self.stomp + self.kick
    }
}

/// Outcome of scoring one completed segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: MotionLabel,
    /// Bounded, monotonic function of the winning score; not a probability
    pub confidence: f64,
    pub scores: MotionScores,
    /// Human-readable description of every rule that matched, in rule order
    pub reasons: Vec<String>,
    pub features: FeatureVector,
}

/// Process-lifetime detection counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionStats {
    pub stomp: u64,
    pub kick: u64,
    pub total_processed: u64,
}

/// Segmentation state tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorStateTag {
    #[default]
    Idle,
    Building,
    Analyzing,
}

/// Event payload delivered to downstream consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionEvent {
    pub motion_type: MotionLabel,
    pub confidence: f64,
    /// Timestamp of the sample that completed the segment
    pub timestamp: f64,
    pub scores: MotionScores,
    pub reasons: Vec<String>,
    /// Counters after this event was recorded
    pub stats: DetectionStats,
}

impl MotionEvent {
    pub fn from_result(result: &ClassificationResult, timestamp: f64, stats: DetectionStats) -> Self {
        Self {
            motion_type: result.label,
            confidence: result.confidence,
            timestamp,
            scores: result.scores,
            reasons: result.reasons.clone(),
            stats,
        }
    }

    /// Serialize to a compact JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_event_wire_format() {
        let event = MotionEvent {
            motion_type: MotionLabel::Kick,
            confidence: 0.6,
            timestamp: 12.5,
            scores: MotionScores {
                stomp: 2.0,
                kick: 6.0,
            },
            reasons: vec!["duration in kick range".to_string()],
            stats: DetectionStats {
                stomp: 0,
                kick: 1,
                total_processed: 400,
            },
        };

        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["motion_type"], "kick");
        assert_eq!(value["scores"]["kick"], 6.0);
        assert_eq!(value["stats"]["total_processed"], 400);
        assert_eq!(value["reasons"][0], "duration in kick range");
    }

    #[test]
    fn test_sample_finiteness() {
        let ok = Sample::new(0.0, Vector3::new(0.0, 0.0, 1.0), Vector3::default());
        let bad = Sample::new(0.0, Vector3::new(f64::NAN, 0.0, 1.0), Vector3::default());
        assert!(ok.is_finite());
        assert!(!bad.is_finite());
    }

    #[test]
    fn test_state_tag_serialization() {
        assert_eq!(
            serde_json::to_string(&DetectorStateTag::Building).unwrap(),
            "\"building\""
        );
    }
}

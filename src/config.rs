//! Detector configuration
//!
//! `Thresholds` is a plain value that can be loaded from JSON. `SharedThresholds`
//! lets a control thread update it while the sample pipeline reads one
//! consistent snapshot per processed sample (last write wins).

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;

/// Tunable detector parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Short-window intensity above which a gesture starts
    pub motion_intensity_threshold: f64,
    /// Seconds a gesture must last before it may end naturally
    pub min_motion_duration: f64,
    /// Seconds after which a gesture is force-analyzed
    pub max_motion_duration: f64,
    /// Minimum seconds between two emitted events
    pub cooldown: f64,
    /// Seconds a calibration request waits for the window to refill
    pub calibration_timeout: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            motion_intensity_threshold: 0.12,
            min_motion_duration: 0.5,
            max_motion_duration: 3.0,
            cooldown: 2.5,
            calibration_timeout: 10.0,
        }
    }
}

impl Thresholds {
    /// Parse thresholds from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Overwrite a single field
    pub fn set(&mut self, field: ThresholdField, value: f64) {
        match field {
            ThresholdField::MotionIntensityThreshold => self.motion_intensity_threshold = value,
            ThresholdField::MinMotionDuration => self.min_motion_duration = value,
            ThresholdField::MaxMotionDuration => self.max_motion_duration = value,
            ThresholdField::Cooldown => self.cooldown = value,
        }
    }
}

/// Fields writable through the reconfiguration interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdField {
    MotionIntensityThreshold,
    MinMotionDuration,
    MaxMotionDuration,
    Cooldown,
}

impl ThresholdField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdField::MotionIntensityThreshold => "motion_intensity_threshold",
            ThresholdField::MinMotionDuration => "min_motion_duration",
            ThresholdField::MaxMotionDuration => "max_motion_duration",
            ThresholdField::Cooldown => "cooldown",
        }
    }
}

/// Coerce a JSON number or numeric string into a finite `f64`.
///
/// This is the only validation applied to reconfiguration values.
pub fn coerce_number(field: ThresholdField, value: &Value) -> Result<f64, EngineError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(EngineError::configuration(
            field.as_str(),
            format!("expected a number, got {}", value),
        )),
    }
}

/// Thresholds shared between the sample pipeline and a control thread
#[derive(Debug, Clone, Default)]
pub struct SharedThresholds {
    inner: Arc<RwLock<Thresholds>>,
}

impl SharedThresholds {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            inner: Arc::new(RwLock::new(thresholds)),
        }
    }

    /// Copy of the current values, taken once per processed sample
    pub fn snapshot(&self) -> Thresholds {
        *self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Coerce and apply one field; on error the previous value is retained
    pub fn update(&self, field: ThresholdField, value: &Value) -> Result<f64, EngineError> {
        let coerced = coerce_number(field, value)?;
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .set(field, coerced);
        Ok(coerced)
    }
}

//! Feature extraction
//!
//! This module derives scalar statistics from an ordered run of samples:
//! - Spread (population standard deviation) and range of accel-x, accel-z and gyro-y
//! - Duration and per-channel peak counts
//! - Peak combined intensity
//! - Shape descriptors (transition sharpness, motion smoothness)
//!
//! All variances use the population convention (divide by `n`). The classifier
//! thresholds were tuned against it.

use crate::types::{FeatureVector, Sample};

/// Sequences at or below this length have no defined shape descriptors
const MIN_SHAPE_SAMPLES: usize = 5;

/// Feature extractor for windows and complete segments
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Compute a feature vector over `samples` (in arrival order).
    ///
    /// An empty slice yields the all-zero vector.
    pub fn extract(samples: &[Sample]) -> FeatureVector {
        if samples.is_empty() {
            return FeatureVector::default();
        }

        let accel_x: Vec<f64> = samples.iter().map(|s| s.accel.x).collect();
        let accel_z: Vec<f64> = samples.iter().map(|s| s.accel.z).collect();
        let gyro_y: Vec<f64> = samples.iter().map(|s| s.gyro.y).collect();

        let x_std = population_std(&accel_x);
        let z_std = population_std(&accel_z);
        let y_gyro_std = population_std(&gyro_y);

        FeatureVector {
            x_std,
            z_std,
            y_gyro_std,
            x_range: range(&accel_x),
            z_range: range(&accel_z),
            y_gyro_range: range(&gyro_y),
            duration: compute_duration(samples),
            peak_count_x: count_peaks(&accel_x, x_std),
            peak_count_z: count_peaks(&accel_z, z_std),
            max_intensity: compute_max_intensity(samples),
            transition_sharpness: compute_transition_sharpness(&accel_x, &accel_z),
            motion_smoothness: compute_motion_smoothness(&accel_x, &accel_z),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance (divide by n)
fn population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mu = mean(values);
    values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64]) -> f64 {
    population_variance(values).sqrt()
}

fn range(values: &[f64]) -> f64 {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if min.is_finite() && max.is_finite() {
        max - min
    } else {
        0.0
    }
}

fn compute_duration(samples: &[Sample]) -> f64 {
    match (samples.first(), samples.last()) {
        (Some(first), Some(last)) if samples.len() > 1 => last.timestamp - first.timestamp,
        _ => 0.0,
    }
}

/// Count samples whose magnitude exceeds twice the channel's standard deviation
fn count_peaks(values: &[f64], std: f64) -> u32 {
    let limit = 2.0 * std;
    values.iter().filter(|v| v.abs() > limit).count() as u32
}

/// `max_i(|ax_i| + |az_i| + |gy_i| / 100)`
fn compute_max_intensity(samples: &[Sample]) -> f64 {
    samples
        .iter()
        .map(Sample::instantaneous_intensity)
        .fold(0.0, f64::max)
}

fn first_difference(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Sum over accel x and z of the variance of the second discrete difference.
///
/// Abrupt impacts produce large changes-of-change; smooth swings do not.
fn compute_transition_sharpness(accel_x: &[f64], accel_z: &[f64]) -> f64 {
    if accel_x.len() < MIN_SHAPE_SAMPLES {
        return 0.0;
    }
    let second_x = first_difference(&first_difference(accel_x));
    let second_z = first_difference(&first_difference(accel_z));
    population_variance(&second_x) + population_variance(&second_z)
}

/// Mean over accel x and z of `1 / (1 + var(first difference))`
fn compute_motion_smoothness(accel_x: &[f64], accel_z: &[f64]) -> f64 {
    if accel_x.len() < MIN_SHAPE_SAMPLES {
        return 0.0;
    }
    let smooth_x = 1.0 / (1.0 + population_variance(&first_difference(accel_x)));
    let smooth_z = 1.0 / (1.0 + population_variance(&first_difference(accel_z)));
    (smooth_x + smooth_z) / 2.0
}

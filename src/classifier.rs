//! Rule-based segment classification
//!
//! Scores a completed segment's features against the stomp and kick
//! hypotheses. Every matched rule adds to one or both scores and records a
//! reason. The result is deterministic for a given feature vector.

use tracing::trace;

use crate::features::FeatureExtractor;
use crate::types::{ClassificationResult, FeatureVector, MotionLabel, MotionScores, Sample};

/// Segments shorter than this carry too little signal to classify
pub const MIN_SEGMENT_SAMPLES: usize = 10;

/// Combined score below which a segment is treated as noise
const NOISE_GATE: f64 = 4.0;

/// Winning score must exceed this to produce a label
const MIN_WINNING_SCORE: f64 = 5.0;

/// Upper bound on reported confidence
const MAX_CONFIDENCE: f64 = 0.95;

const STOMP_DURATION: (f64, f64) = (0.8, 2.5);
const KICK_DURATION: (f64, f64) = (1.0, 3.5);
const STOMP_Z_RANGE_MIN: f64 = 3.0;
const KICK_Z_RANGE_MAX: f64 = 1.5;
const STOMP_GYRO_STD: (f64, f64) = (15.0, 120.0);
const KICK_GYRO_STD: (f64, f64) = (50.0, 100.0);
const STOMP_SHARPNESS_MIN: f64 = 0.5;
const KICK_SMOOTHNESS_MIN: f64 = 0.3;
const STOMP_PEAK_INTENSITY_MIN: f64 = 0.5;

/// Scores and the reasons that produced them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreCard {
    pub scores: MotionScores,
    pub reasons: Vec<String>,
}

/// Hand-tuned stomp/kick scorer
pub struct MotionClassifier;

impl MotionClassifier {
    /// Extract features over a whole segment and classify it.
    ///
    /// Returns `None` for segments shorter than [`MIN_SEGMENT_SAMPLES`].
    pub fn classify_segment(segment: &[Sample]) -> Option<ClassificationResult> {
        if segment.len() < MIN_SEGMENT_SAMPLES {
            trace!(samples = segment.len(), "segment too short to classify");
            return None;
        }
        Self::classify(&FeatureExtractor::extract(segment))
    }

    /// Classify a feature vector, or return `None` for noise and ambiguous segments
    pub fn classify(features: &FeatureVector) -> Option<ClassificationResult> {
        let card = Self::score(features);
        let MotionScores { stomp, kick } = card.scores;

        if card.scores.total() < NOISE_GATE {
            trace!(stomp, kick, "rejected as noise");
            return None;
        }

        let (label, winning) = if stomp > kick && stomp > MIN_WINNING_SCORE {
            (MotionLabel::Stomp, stomp)
        } else if kick > stomp && kick > MIN_WINNING_SCORE {
            (MotionLabel::Kick, kick)
        } else {
            trace!(stomp, kick, "ambiguous segment");
            return None;
        };

        Some(ClassificationResult {
            label,
            confidence: confidence_for(winning),
            scores: card.scores,
            reasons: card.reasons,
            features: *features,
        })
    }

    /// Apply every scoring rule without making a decision
    pub fn score(features: &FeatureVector) -> ScoreCard {
        let mut card = ScoreCard::default();
        let f = features;

        // Duration gates overlap; both may match.
        if in_range(f.duration, STOMP_DURATION) {
            card.scores.stomp += 2.0;
            card.reasons.push(format!(
                "duration {:.2}s within stomp range [{}, {}]",
                f.duration, STOMP_DURATION.0, STOMP_DURATION.1
            ));
        }
        if in_range(f.duration, KICK_DURATION) {
            card.scores.kick += 2.0;
            card.reasons.push(format!(
                "duration {:.2}s within kick range [{}, {}]",
                f.duration, KICK_DURATION.0, KICK_DURATION.1
            ));
        }

        if f.z_range > STOMP_Z_RANGE_MIN {
            card.scores.stomp += 3.0;
            card.reasons.push(format!(
                "large vertical range {:.2}g > {}",
                f.z_range, STOMP_Z_RANGE_MIN
            ));
        } else if f.z_range < KICK_Z_RANGE_MAX {
            card.scores.kick += 2.5;
            card.reasons.push(format!(
                "small vertical range {:.2}g < {}",
                f.z_range, KICK_Z_RANGE_MAX
            ));
        }

        if in_range(f.y_gyro_std, STOMP_GYRO_STD) {
            card.scores.stomp += 2.5;
            card.reasons.push(format!(
                "gyro-y spread {:.1}°/s within stomp range [{}, {}]",
                f.y_gyro_std, STOMP_GYRO_STD.0, STOMP_GYRO_STD.1
            ));
        }
        if in_range(f.y_gyro_std, KICK_GYRO_STD) {
            card.scores.kick += 2.5;
            card.reasons.push(format!(
                "gyro-y spread {:.1}°/s within kick range [{}, {}]",
                f.y_gyro_std, KICK_GYRO_STD.0, KICK_GYRO_STD.1
            ));
        }

        if f.transition_sharpness > STOMP_SHARPNESS_MIN {
            card.scores.stomp += 2.0;
            card.reasons.push(format!(
                "sharp transitions {:.2} > {}",
                f.transition_sharpness, STOMP_SHARPNESS_MIN
            ));
        }
        if f.motion_smoothness > KICK_SMOOTHNESS_MIN {
            card.scores.kick += 1.5;
            card.reasons.push(format!(
                "smooth motion {:.2} > {}",
                f.motion_smoothness, KICK_SMOOTHNESS_MIN
            ));
        }

        // Peak intensity only ever supports stomp.
        if f.max_intensity > STOMP_PEAK_INTENSITY_MIN {
            card.scores.stomp += 1.5;
            card.reasons.push(format!(
                "peak intensity {:.2} > {}",
                f.max_intensity, STOMP_PEAK_INTENSITY_MIN
            ));
        }

        card
    }
}

fn in_range(value: f64, (lo, hi): (f64, f64)) -> bool {
    value >= lo && value <= hi
}

fn confidence_for(score: f64) -> f64 {
    (score / 10.0).min(MAX_CONFIDENCE)
}

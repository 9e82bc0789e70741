//! Per-stream detection pipeline
//!
//! `MotionDetector` owns everything one sensor stream needs: the window buffer,
//! the segmentation state machine and the debouncer. Each sample is processed
//! to completion before the next one:
//!
//! 1. Reject non-finite samples (state untouched)
//! 2. Push into the window buffer and count it
//! 3. Step the segmenter (which classifies a segment when it closes)
//! 4. Offer any classification to the debouncer
//!
//! Independent streams get independent detectors; nothing is shared between
//! instances except, optionally, a `SharedThresholds` handle.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::buffer::WindowBuffer;
use crate::config::{SharedThresholds, Thresholds};
use crate::debounce::EventDebouncer;
use crate::error::EngineError;
use crate::segmenter::{SegmentOutcome, Segmenter};
use crate::types::{DetectionStats, DetectorStateTag, MotionEvent, Sample};

/// Result of processing one sample
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub outcome: SegmentOutcome,
    pub event: Option<MotionEvent>,
}

/// Outcome of [`MotionDetector::process_all`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub events: Vec<MotionEvent>,
    /// Samples refused by validation
    pub rejected: usize,
}

/// Read-only view of a detector for the query interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorStatus {
    pub detector_id: String,
    pub state: DetectorStateTag,
    pub buffer_len: usize,
    pub buffer_capacity: usize,
    pub segment_len: usize,
    pub segments_analyzed: u64,
    pub stats: DetectionStats,
    pub thresholds: Thresholds,
}

/// Streaming stomp/kick detector for one sensor
pub struct MotionDetector {
    id: Uuid,
    window: WindowBuffer,
    segmenter: Segmenter,
    debouncer: EventDebouncer,
    thresholds: SharedThresholds,
    segments_analyzed: u64,
}

impl Default for MotionDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionDetector {
    /// Create a detector with default thresholds
    pub fn new() -> Self {
        Self::with_shared_thresholds(SharedThresholds::default())
    }

    pub fn with_thresholds(thresholds: Thresholds) -> Self {
        Self::with_shared_thresholds(SharedThresholds::new(thresholds))
    }

    /// Create a detector reading thresholds that another thread may update
    pub fn with_shared_thresholds(thresholds: SharedThresholds) -> Self {
        Self {
            id: Uuid::new_v4(),
            window: WindowBuffer::default(),
            segmenter: Segmenter::new(),
            debouncer: EventDebouncer::new(),
            thresholds,
            segments_analyzed: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn thresholds(&self) -> &SharedThresholds {
        &self.thresholds
    }

    /// Process one sample and report what happened.
    ///
    /// Non-finite samples are rejected before any state is touched.
    pub fn step(&mut self, sample: Sample) -> Result<StepReport, EngineError> {
        if !sample.is_finite() {
            warn!(detector_id = %self.id, timestamp = sample.timestamp, "rejected non-finite sample");
            return Err(EngineError::InvalidSample(format!(
                "non-finite value in sample at t={}",
                sample.timestamp
            )));
        }

        let thresholds = self.thresholds.snapshot();

        self.window.push(sample);
        self.debouncer.record_processed();

        let outcome = self.segmenter.step(&sample, &self.window, &thresholds);

        let event = match &outcome {
            SegmentOutcome::Completed(segment) => {
                self.segments_analyzed += 1;
                self.debouncer
                    .offer(segment.result.clone(), sample.timestamp, thresholds.cooldown)
            }
            _ => None,
        };

        if let Some(event) = &event {
            info!(
                detector_id = %self.id,
                motion_type = event.motion_type.as_str(),
                confidence = event.confidence,
                stomp_score = event.scores.stomp,
                kick_score = event.scores.kick,
                "motion detected"
            );
        }

        Ok(StepReport { outcome, event })
    }

    /// Process one sample, returning an event if one was emitted
    pub fn process(&mut self, sample: Sample) -> Result<Option<MotionEvent>, EngineError> {
        Ok(self.step(sample)?.event)
    }

    /// Process samples in order, collecting every emitted event.
    ///
    /// Invalid samples are skipped, as in streaming, and counted in
    /// [`BatchReport::rejected`].
    pub fn process_all<I>(&mut self, samples: I) -> BatchReport
    where
        I: IntoIterator<Item = Sample>,
    {
        let mut report = BatchReport::default();
        for sample in samples {
            match self.process(sample) {
                Ok(Some(event)) => report.events.push(event),
                Ok(None) => {}
                Err(_) => report.rejected += 1,
            }
        }
        report
    }

    /// Clear the window and abandon any open segment. Stats and cooldown survive.
    pub fn reset_buffers(&mut self) {
        self.window.clear();
        self.segmenter.reset();
    }

    pub fn stats(&self) -> DetectionStats {
        self.debouncer.stats()
    }

    pub fn state(&self) -> DetectorStateTag {
        self.segmenter.state()
    }

    pub fn buffer_len(&self) -> usize {
        self.window.len()
    }

    pub fn buffer_capacity(&self) -> usize {
        self.window.capacity()
    }

    pub fn is_window_full(&self) -> bool {
        self.window.is_full()
    }

    pub fn status(&self) -> DetectorStatus {
        DetectorStatus {
            detector_id: self.id.to_string(),
            state: self.state(),
            buffer_len: self.window.len(),
            buffer_capacity: self.window.capacity(),
            segment_len: self.segmenter.segment_len(),
            segments_analyzed: self.segments_analyzed,
            stats: self.stats(),
            thresholds: self.thresholds.snapshot(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Synthetic 50 Hz streams shared by the detector, handle and control tests

    use crate::types::{Sample, Vector3};

    pub const DT: f64 = 0.02;

    /// Produces evenly spaced samples with a running clock
    pub struct Stream {
        index: usize,
    }

    impl Stream {
        pub fn new() -> Self {
            Self { index: 0 }
        }

        pub fn now(&self) -> f64 {
            self.index as f64 * DT
        }

        fn next_time(&mut self) -> f64 {
            let t = self.now();
            self.index += 1;
            t
        }

        /// Gravity on z, nothing else
        pub fn calm(&mut self, count: usize) -> Vec<Sample> {
            (0..count)
                .map(|_| {
                    Sample::new(
                        self.next_time(),
                        Vector3::new(0.0, 0.0, 1.0),
                        Vector3::default(),
                    )
                })
                .collect()
        }

        /// Jagged stomp: accel-z swings between 3g and -1g (range 4g), gyro-y ±40°/s
        pub fn stomp(&mut self, count: usize) -> Vec<Sample> {
            (0..count)
                .map(|i| {
                    let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                    Sample::new(
                        self.next_time(),
                        Vector3::new(sign, 0.0, 1.0 + 2.0 * sign),
                        Vector3::new(0.0, 40.0 * sign, 0.0),
                    )
                })
                .collect()
        }

        /// Smooth leg swing: 2 Hz sinusoid, accel-z within 1g ± 0.5g, gyro-y ±100°/s
        pub fn kick(&mut self, count: usize) -> Vec<Sample> {
            (0..count)
                .map(|i| {
                    let phase = (2.0 * std::f64::consts::PI * i as f64 / 25.0).sin();
                    Sample::new(
                        self.next_time(),
                        Vector3::new(0.5 * phase, 0.0, 1.0 + 0.5 * phase),
                        Vector3::new(0.0, 100.0 * phase, 0.0),
                    )
                })
                .collect()
        }
    }
}

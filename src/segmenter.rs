//! Online gesture segmentation
//!
//! A three-state machine decides where a gesture starts and ends without
//! look-ahead:
//!
//! ```text
//!   Idle ──(short-window intensity > threshold)──▶ Building
//!   Building ──(timeout | sustained quiet)──▶ Analyzing ──(same step)──▶ Idle
//! ```
//!
//! While building, every full-resolution sample is kept in the segment. When
//! the segment ends it is classified as a whole and the buffer is cleared.

use std::collections::VecDeque;

use tracing::debug;

use crate::buffer::WindowBuffer;
use crate::classifier::MotionClassifier;
use crate::config::Thresholds;
use crate::features::FeatureExtractor;
use crate::types::{ClassificationResult, DetectorStateTag, Sample};

/// Samples in the short intensity window
pub const SHORT_WINDOW: usize = 15;

/// No gesture can start until this many samples have been buffered
pub const COLD_START_SAMPLES: u64 = 20;

/// Consecutive quiet windows required for a natural end
pub const QUIET_WINDOWS: usize = 3;

/// Natural end needs intensity below `threshold * QUIET_FACTOR`
pub const QUIET_FACTOR: f64 = 0.5;

/// Why a segment stopped building
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Exceeded `max_motion_duration`
    Timeout,
    /// Intensity stayed low for [`QUIET_WINDOWS`] windows after `min_motion_duration`
    Quiet,
}

/// A segment that went through analysis
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedSegment {
    pub reason: EndReason,
    pub sample_count: usize,
    pub started_at: f64,
    pub ended_at: f64,
    /// `None` when the segment was too short, noisy or ambiguous
    pub result: Option<ClassificationResult>,
}

/// What one sample did to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentOutcome {
    /// Still idle (or cold-starting)
    Idle,
    /// This sample opened a new segment
    Started { intensity: f64 },
    /// Sample appended to the open segment
    Building { intensity: f64 },
    /// Segment closed and analyzed; state is back to idle
    Completed(CompletedSegment),
}

/// Segmentation state for a single sensor stream
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    state: DetectorStateTag,
    motion_start_time: Option<f64>,
    segment: Vec<Sample>,
    quiet_history: VecDeque<f64>,
}

impl Segmenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DetectorStateTag {
        self.state
    }

    pub fn motion_start_time(&self) -> Option<f64> {
        self.motion_start_time
    }

    pub fn segment_len(&self) -> usize {
        self.segment.len()
    }

    /// Advance the machine by one sample.
    ///
    /// `window` must already contain `sample` as its newest entry.
    pub fn step(
        &mut self,
        sample: &Sample,
        window: &WindowBuffer,
        thresholds: &Thresholds,
    ) -> SegmentOutcome {
        match self.state {
            DetectorStateTag::Idle => self.step_idle(sample, window, thresholds),
            DetectorStateTag::Building => self.step_building(sample, window, thresholds),
            // Analyzing never survives a step; recover to idle if it ever does.
            DetectorStateTag::Analyzing => {
                self.reset();
                SegmentOutcome::Idle
            }
        }
    }

    /// Abandon any open segment and return to idle
    pub fn reset(&mut self) {
        self.state = DetectorStateTag::Idle;
        self.motion_start_time = None;
        self.segment.clear();
        self.quiet_history.clear();
    }

    fn step_idle(
        &mut self,
        sample: &Sample,
        window: &WindowBuffer,
        thresholds: &Thresholds,
    ) -> SegmentOutcome {
        if window.total_pushed() < COLD_START_SAMPLES {
            return SegmentOutcome::Idle;
        }

        let intensity = short_window_intensity(window);
        if intensity <= thresholds.motion_intensity_threshold {
            return SegmentOutcome::Idle;
        }

        self.state = DetectorStateTag::Building;
        self.motion_start_time = Some(sample.timestamp);
        self.segment.clear();
        self.quiet_history.clear();

        debug!(
            timestamp = sample.timestamp,
            intensity,
            threshold = thresholds.motion_intensity_threshold,
            "motion started"
        );
        SegmentOutcome::Started { intensity }
    }

    fn step_building(
        &mut self,
        sample: &Sample,
        window: &WindowBuffer,
        thresholds: &Thresholds,
    ) -> SegmentOutcome {
        self.segment.push(*sample);

        let intensity = short_window_intensity(window);
        if self.quiet_history.len() == QUIET_WINDOWS {
            self.quiet_history.pop_front();
        }
        self.quiet_history.push_back(intensity);

        let started_at = self.motion_start_time.unwrap_or(sample.timestamp);
        let elapsed = sample.timestamp - started_at;

        let reason = if elapsed > thresholds.max_motion_duration {
            Some(EndReason::Timeout)
        } else if elapsed > thresholds.min_motion_duration
            && self.is_quiet(thresholds.motion_intensity_threshold * QUIET_FACTOR)
        {
            Some(EndReason::Quiet)
        } else {
            None
        };

        match reason {
            Some(reason) => SegmentOutcome::Completed(self.analyze(reason, started_at, sample.timestamp)),
            None => SegmentOutcome::Building { intensity },
        }
    }

    fn is_quiet(&self, limit: f64) -> bool {
        self.quiet_history.len() == QUIET_WINDOWS
            && self.quiet_history.iter().all(|&i| i < limit)
    }

    /// Analyzing: classify the whole segment, then drop back to idle
    fn analyze(&mut self, reason: EndReason, started_at: f64, ended_at: f64) -> CompletedSegment {
        self.state = DetectorStateTag::Analyzing;

        let result = MotionClassifier::classify_segment(&self.segment);
        let completed = CompletedSegment {
            reason,
            sample_count: self.segment.len(),
            started_at,
            ended_at,
            result,
        };

        debug!(
            reason = ?completed.reason,
            samples = completed.sample_count,
            duration = ended_at - started_at,
            label = completed.result.as_ref().map(|r| r.label.as_str()),
            "segment analyzed"
        );

        self.reset();
        completed
    }
}

/// `x_std + z_std + y_gyro_std / 100` over the newest [`SHORT_WINDOW`] samples
pub fn short_window_intensity(window: &WindowBuffer) -> f64 {
    let recent: Vec<Sample> = window.recent(SHORT_WINDOW).copied().collect();
    FeatureExtractor::extract(&recent).intensity()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vector3;
    use pretty_assertions::assert_eq;

    const DT: f64 = 0.02;

    fn calm(t: f64) -> Sample {
        Sample::new(t, Vector3::new(0.0, 0.0, 1.0), Vector3::default())
    }

    fn active(t: f64, i: usize) -> Sample {
        let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
        Sample::new(
            t,
            Vector3::new(sign, 0.0, 1.0 + 2.0 * sign),
            Vector3::new(0.0, 40.0 * sign, 0.0),
        )
    }

    struct Harness {
        window: WindowBuffer,
        segmenter: Segmenter,
        thresholds: Thresholds,
        t: f64,
        n: usize,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                window: WindowBuffer::default(),
                segmenter: Segmenter::new(),
                thresholds: Thresholds::default(),
                t: 0.0,
                n: 0,
            }
        }

        fn feed(&mut self, sample: Sample) -> SegmentOutcome {
            self.window.push(sample);
            self.n += 1;
            self.t = self.n as f64 * DT;
            self.segmenter.step(&sample, &self.window, &self.thresholds)
        }

        fn feed_calm(&mut self, count: usize) -> Vec<SegmentOutcome> {
            (0..count).map(|_| self.feed(calm(self.t))).collect()
        }

        fn feed_active(&mut self, count: usize) -> Vec<SegmentOutcome> {
            (0..count)
                .map(|i| {
                    let t = self.t;
                    self.feed(active(t, i))
                })
                .collect()
        }
    }

    #[test]
    fn test_cold_start_guard() {
        let mut h = Harness::new();
        // Violent motion from the first sample cannot start a segment before 20 samples
        let outcomes = h.feed_active(19);
        assert!(outcomes.iter().all(|o| *o == SegmentOutcome::Idle));
        assert!(matches!(h.feed_active(1)[0], SegmentOutcome::Started { .. }));
    }

    #[test]
    fn test_calm_stream_stays_idle() {
        let mut h = Harness::new();
        let outcomes = h.feed_calm(200);
        assert!(outcomes.iter().all(|o| *o == SegmentOutcome::Idle));
        assert_eq!(h.segmenter.state(), DetectorStateTag::Idle);
    }

    #[test]
    fn test_trigger_sample_not_in_segment() {
        let mut h = Harness::new();
        h.feed_calm(30);
        assert!(matches!(h.feed_active(1)[0], SegmentOutcome::Started { .. }));
        assert_eq!(h.segmenter.segment_len(), 0);
        assert_eq!(h.segmenter.state(), DetectorStateTag::Building);
        h.feed_active(5);
        assert_eq!(h.segmenter.segment_len(), 5);
    }

    #[test]
    fn test_quiet_end_requires_three_quiet_windows() {
        let mut h = Harness::new();
        h.feed_calm(30);
        h.feed_active(60);
        assert_eq!(h.segmenter.state(), DetectorStateTag::Building);

        // The first 15 calm samples still have motion inside the short window;
        // the next two are quiet but the history is not yet three deep.
        let outcomes = h.feed_calm(16);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, SegmentOutcome::Building { .. })));

        match h.feed_calm(1).remove(0) {
            SegmentOutcome::Completed(segment) => {
                assert_eq!(segment.reason, EndReason::Quiet);
                assert_eq!(segment.sample_count, 59 + 17);
            }
            other => panic!("expected completed segment, got {:?}", other),
        }
        assert_eq!(h.segmenter.state(), DetectorStateTag::Idle);
        assert_eq!(h.segmenter.segment_len(), 0);
        assert_eq!(h.segmenter.motion_start_time(), None);
    }

    #[test]
    fn test_quiet_end_waits_for_min_duration() {
        let mut h = Harness::new();
        h.thresholds.min_motion_duration = 2.0;
        h.feed_calm(30);
        h.feed_active(10);
        // quiet after 0.2s of motion, but min duration is 2s
        let outcomes = h.feed_calm(60);
        assert!(outcomes
            .iter()
            .all(|o| !matches!(o, SegmentOutcome::Completed(_))));
        let rest = h.feed_calm(60);
        assert!(rest.iter().any(|o| matches!(
            o,
            SegmentOutcome::Completed(CompletedSegment {
                reason: EndReason::Quiet,
                ..
            })
        )));
    }

    #[test]
    fn test_timeout_forces_analysis() {
        let mut h = Harness::new();
        h.feed_calm(30);
        h.feed_active(1);
        let start = h.segmenter.motion_start_time().unwrap();

        let mut completed = None;
        for i in 0..400 {
            let t = h.t;
            if let SegmentOutcome::Completed(segment) = h.feed(active(t, i + 1)) {
                completed = Some(segment);
                break;
            }
        }

        let segment = completed.expect("segment must terminate");
        assert_eq!(segment.reason, EndReason::Timeout);
        let elapsed = segment.ended_at - start;
        assert!(elapsed > 3.0 && elapsed <= 3.0 + DT + 1e-9);
        assert_eq!(h.segmenter.state(), DetectorStateTag::Idle);
    }

    #[test]
    fn test_short_segment_yields_no_result() {
        let mut h = Harness::new();
        h.thresholds.max_motion_duration = 0.1;
        h.feed_calm(30);
        h.feed_active(1);
        let outcomes = h.feed_active(8);
        let segment = outcomes
            .into_iter()
            .find_map(|o| match o {
                SegmentOutcome::Completed(s) => Some(s),
                _ => None,
            })
            .expect("timeout at 0.1s");
        assert!(segment.sample_count < crate::classifier::MIN_SEGMENT_SAMPLES);
        assert!(segment.result.is_none());
    }
}

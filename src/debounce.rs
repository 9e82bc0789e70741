//! Cooldown gate between classification and emission
//!
//! The debouncer is the single place that decides whether a classified
//! segment becomes an event, and the only writer of `DetectionStats`.

use tracing::debug;

use crate::types::{ClassificationResult, DetectionStats, MotionEvent, MotionLabel};

/// Drops results that arrive within the cooldown of the previous event
#[derive(Debug, Clone, Default)]
pub struct EventDebouncer {
    /// `None` until the first emission, which behaves as negative infinity
    last_emit_time: Option<f64>,
    stats: DetectionStats,
}

impl EventDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one processed sample
    pub fn record_processed(&mut self) {
        self.stats.total_processed += 1;
    }

    /// Gate a classification result.
    ///
    /// Emits only when `result` is present and more than `cooldown` seconds have
    /// elapsed since the last emission. Rejected results are discarded.
    pub fn offer(
        &mut self,
        result: Option<ClassificationResult>,
        now: f64,
        cooldown: f64,
    ) -> Option<MotionEvent> {
        let result = result?;

        if let Some(last) = self.last_emit_time {
            let elapsed = now - last;
            if elapsed <= cooldown {
                debug!(
                    label = result.label.as_str(),
                    elapsed, cooldown, "classification dropped by cooldown"
                );
                return None;
            }
        }

        match result.label {
            MotionLabel::Stomp => self.stats.stomp += 1,
            MotionLabel::Kick => self.stats.kick += 1,
        }
        self.last_emit_time = Some(now);

        Some(MotionEvent::from_result(&result, now, self.stats))
    }

    pub fn stats(&self) -> DetectionStats {
        self.stats
    }

    pub fn last_emit_time(&self) -> Option<f64> {
        self.last_emit_time
    }
}

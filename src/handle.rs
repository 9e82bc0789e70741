//! Thread-safe detector handle
//!
//! Hosts that receive samples on one thread and commands on another share a
//! `DetectorHandle`. Sample processing stays strictly sequential behind the
//! lock; a calibration request waits on a channel outside the lock so the
//! sample pipeline is never blocked by it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::config::SharedThresholds;
use crate::detector::{DetectorStatus, MotionDetector};
use crate::error::EngineError;
use crate::sink::EventSink;
use crate::types::{DetectionStats, MotionEvent, Sample};

struct Inner {
    detector: MotionDetector,
    sink: Option<Box<dyn EventSink + Send>>,
    calibration_waiters: Vec<Sender<()>>,
}

/// Cloneable, shareable wrapper around a [`MotionDetector`]
#[derive(Clone)]
pub struct DetectorHandle {
    inner: Arc<Mutex<Inner>>,
}

impl DetectorHandle {
    pub fn new(detector: MotionDetector) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                detector,
                sink: None,
                calibration_waiters: Vec::new(),
            })),
        }
    }

    /// Attach a sink that receives every emitted event
    pub fn with_sink(detector: MotionDetector, sink: Box<dyn EventSink + Send>) -> Self {
        let handle = Self::new(detector);
        handle.lock().sink = Some(sink);
        handle
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Process one sample; emitted events are delivered to the sink (if any)
    /// and returned.
    ///
    /// Sink failures are logged and never surface here.
    pub fn process(&self, sample: Sample) -> Result<Option<MotionEvent>, EngineError> {
        let mut inner = self.lock();
        let event = inner.detector.process(sample)?;

        if let Some(event) = &event {
            if let Some(sink) = inner.sink.as_mut() {
                if let Err(e) = sink.deliver(event) {
                    warn!(error = %e, "event delivery failed");
                }
            }
        }

        if inner.detector.is_window_full() && !inner.calibration_waiters.is_empty() {
            for waiter in inner.calibration_waiters.drain(..) {
                let _ = waiter.try_send(());
            }
        }

        Ok(event)
    }

    /// Clear all buffers and return a waiter that resolves once the window
    /// buffer has refilled.
    pub fn begin_calibration(&self) -> CalibrationWaiter {
        let (tx, rx) = channel::bounded(1);
        let mut inner = self.lock();
        inner.detector.reset_buffers();
        inner.calibration_waiters.push(tx);
        info!(detector_id = %inner.detector.id(), "calibration started");

        CalibrationWaiter {
            handle: self.clone(),
            done: rx,
        }
    }

    pub fn stats(&self) -> DetectionStats {
        self.lock().detector.stats()
    }

    pub fn status(&self) -> DetectorStatus {
        self.lock().detector.status()
    }

    pub fn thresholds(&self) -> SharedThresholds {
        self.lock().detector.thresholds().clone()
    }
}

/// Pending calibration; see [`DetectorHandle::begin_calibration`]
pub struct CalibrationWaiter {
    handle: DetectorHandle,
    done: Receiver<()>,
}

impl CalibrationWaiter {
    /// Block the calling thread until the window is full or `timeout` elapses
    pub fn wait(self, timeout: Duration) -> Result<DetectorStatus, EngineError> {
        let started = Instant::now();
        match self.done.recv_timeout(timeout) {
            Ok(()) => {
                let status = self.handle.status();
                info!(
                    detector_id = %status.detector_id,
                    buffered = status.buffer_len,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "calibration completed"
                );
                Ok(status)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                let status = self.handle.status();
                debug!(buffered = status.buffer_len, "calibration wait expired");
                Err(EngineError::CalibrationTimeout {
                    waited_secs: started.elapsed().as_secs_f64(),
                    buffered: status.buffer_len,
                    capacity: status.buffer_capacity,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::test_support::Stream;
    use crate::sink::ChannelSink;
    use crate::types::{DetectorStateTag, MotionLabel};
    use std::thread;

    #[test]
    fn test_events_reach_sink() {
        let (tx, rx) = channel::unbounded();
        let handle = DetectorHandle::with_sink(MotionDetector::new(), Box::new(ChannelSink::new(tx)));
        let mut stream = Stream::new();

        let mut samples = stream.calm(30);
        samples.extend(stream.stomp(60));
        samples.extend(stream.calm(30));
        for sample in samples {
            handle.process(sample).unwrap();
        }

        let event = rx.try_recv().unwrap();
        assert_eq!(event.motion_type, MotionLabel::Stomp);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_receiver_does_not_break_pipeline() {
        let (tx, rx) = channel::bounded(1);
        drop(rx);
        let handle = DetectorHandle::with_sink(MotionDetector::new(), Box::new(ChannelSink::new(tx)));
        let mut stream = Stream::new();

        let mut samples = stream.calm(30);
        samples.extend(stream.stomp(60));
        samples.extend(stream.calm(30));
        let emitted: Vec<_> = samples
            .into_iter()
            .filter_map(|s| handle.process(s).unwrap())
            .collect();
        assert_eq!(emitted.len(), 1);
        assert_eq!(handle.stats().stomp, 1);
    }

    #[test]
    fn test_calibration_completes_when_window_refills() {
        let handle = DetectorHandle::new(MotionDetector::new());
        let mut stream = Stream::new();
        for sample in stream.calm(50) {
            handle.process(sample).unwrap();
        }

        let waiter = handle.begin_calibration();
        assert_eq!(handle.status().buffer_len, 0);

        let feeder = {
            let handle = handle.clone();
            let samples = stream.calm(80);
            thread::spawn(move || {
                for sample in samples {
                    handle.process(sample).unwrap();
                }
            })
        };

        let status = waiter.wait(Duration::from_secs(5)).unwrap();
        feeder.join().unwrap();
        assert_eq!(status.buffer_len, status.buffer_capacity);
        assert_eq!(status.state, DetectorStateTag::Idle);
        assert_eq!(handle.stats().total_processed, 130);
    }

    #[test]
    fn test_calibration_times_out_without_samples() {
        let handle = DetectorHandle::new(MotionDetector::new());
        let waiter = handle.begin_calibration();
        let err = waiter.wait(Duration::from_millis(20)).unwrap_err();
        match err {
            EngineError::CalibrationTimeout {
                buffered, capacity, ..
            } => {
                assert_eq!(buffered, 0);
                assert_eq!(capacity, 80);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}

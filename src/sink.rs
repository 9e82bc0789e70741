//! Event delivery seam
//!
//! The detector hands emitted events to an `EventSink` and moves on. Sinks must
//! not block the sample pipeline; failures are reported back and logged by the
//! caller, never retried.

use std::io::Write;

use crossbeam::channel::{Sender, TrySendError};

use crate::error::EngineError;
use crate::types::MotionEvent;

/// Destination for emitted motion events
pub trait EventSink {
    fn deliver(&mut self, event: &MotionEvent) -> Result<(), EngineError>;
}

/// Writes one JSON object per line
pub struct NdjsonSink<W: Write> {
    writer: W,
    flush: bool,
}

impl<W: Write> NdjsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            flush: true,
        }
    }

    /// Control whether every event is flushed immediately
    pub fn with_flush(mut self, flush: bool) -> Self {
        self.flush = flush;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EventSink for NdjsonSink<W> {
    fn deliver(&mut self, event: &MotionEvent) -> Result<(), EngineError> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        if self.flush {
            self.writer.flush()?;
        }
        Ok(())
    }
}

/// Forwards events into a channel without ever blocking
pub struct ChannelSink {
    tx: Sender<MotionEvent>,
}

impl ChannelSink {
    pub fn new(tx: Sender<MotionEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn deliver(&mut self, event: &MotionEvent) -> Result<(), EngineError> {
        match self.tx.try_send(event.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(EngineError::Sink("event channel full".to_string())),
            Err(TrySendError::Disconnected(_)) => {
                Err(EngineError::Sink("event channel disconnected".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DetectionStats, MotionLabel, MotionScores};
    use crossbeam::channel;

    fn event() -> MotionEvent {
        MotionEvent {
            motion_type: MotionLabel::Stomp,
            confidence: 0.9,
            timestamp: 4.2,
            scores: MotionScores {
                stomp: 9.0,
                kick: 2.0,
            },
            reasons: vec!["peak intensity 3.00 > 0.5".to_string()],
            stats: DetectionStats {
                stomp: 1,
                kick: 0,
                total_processed: 210,
            },
        }
    }

    #[test]
    fn test_ndjson_sink_writes_lines() {
        let mut sink = NdjsonSink::new(Vec::new());
        sink.deliver(&event()).unwrap();
        sink.deliver(&event()).unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: MotionEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, event());
    }

    #[test]
    fn test_channel_sink_full_is_an_error_not_a_block() {
        let (tx, rx) = channel::bounded(1);
        let mut sink = ChannelSink::new(tx);
        sink.deliver(&event()).unwrap();
        assert!(matches!(sink.deliver(&event()), Err(EngineError::Sink(_))));
        assert_eq!(rx.len(), 1);
    }
}

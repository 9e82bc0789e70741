//! Sensor input adapters
//!
//! Adapters turn whatever the transport delivers (raw BLE notification bytes,
//! bridge JSON lines) into the canonical [`Sample`] the detector consumes.
//! Timestamps are supplied by the caller when the payload has none.

mod bridge;
mod im600;

pub use bridge::{BridgeJsonAdapter, BridgeSample};
pub use im600::{hex_dashed, parse_hex, Im600PacketAdapter, IM600_PACKET_LEN};

use crate::error::EngineError;
use crate::types::Sample;

/// Trait for sensor payload adapters
pub trait SampleAdapter {
    /// Borrowed payload type this adapter understands
    type Input: ?Sized;

    /// Decode one payload into a sample stamped with `timestamp`
    fn decode(&self, input: &Self::Input, timestamp: f64) -> Result<Sample, EngineError>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

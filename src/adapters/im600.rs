//! im600 IMU packet adapter
//!
//! The sensor streams fixed-layout notifications over BLE. Only the motion
//! block is read: six big-endian `i16` words starting at byte 10.

use tracing::trace;

use super::SampleAdapter;
use crate::error::EngineError;
use crate::types::{Sample, Vector3};

/// Minimum packet length carrying a full accel + gyro block
pub const IM600_PACKET_LEN: usize = 22;

const ACCEL_OFFSET: usize = 10;
const GYRO_OFFSET: usize = 16;
/// ±16 g full scale
const ACCEL_SCALE: f64 = 16.0 / 32768.0;
/// ±2000 °/s full scale
const GYRO_SCALE: f64 = 2000.0 / 32768.0;

/// Decoder for raw im600 notification payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct Im600PacketAdapter;

impl Im600PacketAdapter {
    pub fn new() -> Self {
        Self
    }

    fn read_vector(packet: &[u8], offset: usize, scale: f64) -> Vector3 {
        let word = |i: usize| {
            let at = offset + i * 2;
            f64::from(i16::from_be_bytes([packet[at], packet[at + 1]])) * scale
        };
        Vector3::new(word(0), word(1), word(2))
    }
}

impl SampleAdapter for Im600PacketAdapter {
    type Input = [u8];

    fn decode(&self, packet: &[u8], timestamp: f64) -> Result<Sample, EngineError> {
        if packet.len() < IM600_PACKET_LEN {
            return Err(EngineError::MalformedPacket {
                expected: IM600_PACKET_LEN,
                actual: packet.len(),
            });
        }

        let accel = Self::read_vector(packet, ACCEL_OFFSET, ACCEL_SCALE);
        let gyro = Self::read_vector(packet, GYRO_OFFSET, GYRO_SCALE);
        trace!(len = packet.len(), timestamp, "decoded im600 packet");

        Ok(Sample::new(timestamp, accel, gyro))
    }

    fn name(&self) -> &'static str {
        "im600"
    }
}

/// Render bytes as upper-case hex pairs joined by dashes (`0A-FF-10`)
pub fn hex_dashed(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join("-")
}

/// Parse a hex string, with or without dash/space/colon separators
pub fn parse_hex(text: &str) -> Result<Vec<u8>, EngineError> {
    let digits: Vec<char> = text
        .chars()
        .filter(|c| !matches!(c, '-' | ' ' | ':'))
        .collect();

    if digits.len() % 2 != 0 {
        return Err(EngineError::InvalidSample(format!(
            "odd number of hex digits ({})",
            digits.len()
        )));
    }

    digits
        .chunks(2)
        .map(|pair| {
            let s: String = pair.iter().collect();
            u8::from_str_radix(&s, 16)
                .map_err(|_| EngineError::InvalidSample(format!("invalid hex byte '{s}'")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn packet(accel: [i16; 3], gyro: [i16; 3]) -> Vec<u8> {
        let mut bytes = vec![0u8; 10];
        for word in accel.iter().chain(gyro.iter()) {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        bytes
    }

    #[test]
    fn test_decode_scales_words() {
        let bytes = packet([2048, 0, -2048], [0, 16384, -32768]);
        let sample = Im600PacketAdapter.decode(&bytes, 1.5).unwrap();

        assert_eq!(sample.timestamp, 1.5);
        assert_eq!(sample.accel, Vector3::new(1.0, 0.0, -1.0));
        assert_eq!(sample.gyro, Vector3::new(0.0, 1000.0, -2000.0));
    }

    #[test]
    fn test_trailing_bytes_are_ignored() {
        let mut bytes = packet([2048, 2048, 2048], [0, 0, 0]);
        bytes.extend_from_slice(&[0xFF; 6]);
        let sample = Im600PacketAdapter.decode(&bytes, 0.0).unwrap();
        assert_eq!(sample.accel, Vector3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_short_packet_rejected() {
        let err = Im600PacketAdapter.decode(&[0u8; 21], 0.0).unwrap_err();
        match err {
            EngineError::MalformedPacket { expected, actual } => {
                assert_eq!(expected, 22);
                assert_eq!(actual, 21);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(hex_dashed(&[0x0a, 0xff, 0x10]), "0A-FF-10");
        assert_eq!(parse_hex("0A-ff-10").unwrap(), vec![0x0a, 0xff, 0x10]);
        assert_eq!(parse_hex("0aff10").unwrap(), vec![0x0a, 0xff, 0x10]);
        assert!(parse_hex("0A-F").is_err());
        assert!(parse_hex("zz").is_err());
    }
}

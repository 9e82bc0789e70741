//! Stompkick - Streaming stomp/kick detection for wearable IMU sensors
//!
//! Stompkick turns a stream of timestamped accelerometer + gyroscope samples
//! into discrete gesture events through a per-sample pipeline:
//! window buffering → motion segmentation → feature extraction → rule-based
//! classification → cooldown debouncing.
//!
//! ## Modules
//!
//! - **Engine**: [`MotionDetector`] processes one sensor stream, sample by sample
//! - **Adapters**: decode im600 BLE packets and bridge JSON into [`Sample`]s
//! - **Control**: tagged JSON commands for live reconfiguration and calibration
//! - **FFI**: C-compatible bindings for host applications

pub mod adapters;
pub mod buffer;
pub mod classifier;
pub mod config;
pub mod control;
pub mod debounce;
pub mod detector;
pub mod error;
pub mod features;
pub mod handle;
pub mod segmenter;
pub mod sink;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use adapters::{BridgeJsonAdapter, Im600PacketAdapter, SampleAdapter};
pub use classifier::MotionClassifier;
pub use config::{SharedThresholds, ThresholdField, Thresholds};
pub use control::{Command, CommandDispatcher, Response};
pub use detector::{BatchReport, DetectorStatus, MotionDetector};
pub use error::EngineError;
pub use features::FeatureExtractor;
pub use handle::DetectorHandle;
pub use sink::{ChannelSink, EventSink, NdjsonSink};
pub use types::{
    ClassificationResult, DetectionStats, DetectorStateTag, FeatureVector, MotionEvent,
    MotionLabel, MotionScores, Sample, Vector3,
};

/// Engine version reported by the CLI and the FFI
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported in CLI diagnostics
pub const PRODUCER_NAME: &str = "stompkick";

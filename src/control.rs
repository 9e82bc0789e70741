//! Runtime control interface
//!
//! Commands arrive as tagged JSON objects (`{"command": "set_cooldown",
//! "value": 3}`) and are answered with tagged responses (`{"response": ...}`).
//! Dispatch happens outside the detector: threshold writes go through
//! `SharedThresholds`, and `calibrate` blocks only the thread that dispatches
//! it while samples keep flowing through the handle.

use std::time::Duration;

use crossbeam::channel::Sender;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::adapters::BridgeSample;
use crate::config::ThresholdField;
use crate::detector::DetectorStatus;
use crate::error::EngineError;
use crate::handle::DetectorHandle;
use crate::types::DetectionStats;

/// Control commands accepted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Ping,
    SetIntensityThreshold { value: Value },
    SetMinMotionDuration { value: Value },
    SetMaxMotionDuration { value: Value },
    SetCooldown { value: Value },
    GetStats,
    GetStatus,
    Calibrate,
}

impl Command {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Target field and raw value for threshold setters
    pub fn threshold_update(&self) -> Option<(ThresholdField, &Value)> {
        match self {
            Command::SetIntensityThreshold { value } => {
                Some((ThresholdField::MotionIntensityThreshold, value))
            }
            Command::SetMinMotionDuration { value } => Some((ThresholdField::MinMotionDuration, value)),
            Command::SetMaxMotionDuration { value } => Some((ThresholdField::MaxMotionDuration, value)),
            Command::SetCooldown { value } => Some((ThresholdField::Cooldown, value)),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::SetIntensityThreshold { .. } => "set_intensity_threshold",
            Command::SetMinMotionDuration { .. } => "set_min_motion_duration",
            Command::SetMaxMotionDuration { .. } => "set_max_motion_duration",
            Command::SetCooldown { .. } => "set_cooldown",
            Command::GetStats => "get_stats",
            Command::GetStatus => "get_status",
            Command::Calibrate => "calibrate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationPhase {
    Started,
    Completed,
}

/// Replies produced by [`CommandDispatcher`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "snake_case")]
pub enum Response {
    Pong,
    ThresholdUpdated { field: String, value: f64 },
    ConfigurationError { field: String, message: String },
    Stats { stats: DetectionStats },
    Status { status: Box<DetectorStatus> },
    Calibration { phase: CalibrationPhase },
    Error { message: String },
}

impl Response {
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// One line of a mixed input stream
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Command(Command),
    Sample(BridgeSample),
}

impl Inbound {
    /// Objects carrying a `command` key are commands, anything else must be a
    /// bridge sample.
    pub fn parse(line: &str) -> Result<Self, EngineError> {
        let value: Value = serde_json::from_str(line)?;
        if value.get("command").is_some() {
            Ok(Inbound::Command(serde_json::from_value(value)?))
        } else {
            Ok(Inbound::Sample(serde_json::from_value(value)?))
        }
    }
}

/// Applies commands to a shared detector
#[derive(Clone)]
pub struct CommandDispatcher {
    handle: DetectorHandle,
}

impl CommandDispatcher {
    pub fn new(handle: DetectorHandle) -> Self {
        Self { handle }
    }

    /// Execute `command`, sending every response to `reply`.
    ///
    /// Returns once the command is finished; for `calibrate` that is after
    /// the window refilled or the calibration timeout elapsed.
    pub fn dispatch(&self, command: Command, reply: &Sender<Response>) {
        debug!(command = command.name(), "dispatching command");

        if let Some((field, value)) = command.threshold_update() {
            let response = match self.handle.thresholds().update(field, value) {
                Ok(value) => Response::ThresholdUpdated {
                    field: field.as_str().to_string(),
                    value,
                },
                Err(EngineError::Configuration { field, message }) => {
                    warn!(field = %field, message = %message, "rejected threshold update");
                    Response::ConfigurationError { field, message }
                }
                Err(e) => Response::Error {
                    message: e.to_string(),
                },
            };
            send(reply, response);
            return;
        }

        match command {
            Command::Ping => send(reply, Response::Pong),
            Command::GetStats => send(
                reply,
                Response::Stats {
                    stats: self.handle.stats(),
                },
            ),
            Command::GetStatus => send(
                reply,
                Response::Status {
                    status: Box::new(self.handle.status()),
                },
            ),
            Command::Calibrate => self.calibrate(reply),
            Command::SetIntensityThreshold { .. }
            | Command::SetMinMotionDuration { .. }
            | Command::SetMaxMotionDuration { .. }
            | Command::SetCooldown { .. } => {}
        }
    }

    /// Execute a command and collect its responses
    pub fn dispatch_collect(&self, command: Command) -> Vec<Response> {
        let (tx, rx) = crossbeam::channel::unbounded();
        self.dispatch(command, &tx);
        drop(tx);
        rx.into_iter().collect()
    }

    fn calibrate(&self, reply: &Sender<Response>) {
        let timeout = self.handle.thresholds().snapshot().calibration_timeout;
        let waiter = self.handle.begin_calibration();
        send(
            reply,
            Response::Calibration {
                phase: CalibrationPhase::Started,
            },
        );

        let wait = Duration::try_from_secs_f64(timeout.max(0.0)).unwrap_or(Duration::MAX);
        match waiter.wait(wait) {
            Ok(_) => send(
                reply,
                Response::Calibration {
                    phase: CalibrationPhase::Completed,
                },
            ),
            Err(e) => {
                warn!(error = %e, "calibration failed");
                send(
                    reply,
                    Response::Error {
                        message: e.to_string(),
                    },
                );
            }
        }
    }
}

fn send(reply: &Sender<Response>, response: Response) {
    if reply.send(response).is_err() {
        debug!("response receiver dropped");
    }
}

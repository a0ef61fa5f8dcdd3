// src/hal/types.rs
//! Data exchanged with the exoskeleton, the telemetry bus and the operator frontend

use crate::config::constants::device;
use crate::error::BusChannel;
use crate::experiment::trial::{Direction, TorqueProfile};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One sample read from the exoskeleton
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExoSample {
    /// Arm angle in degrees
    pub position: f64,
    pub velocity: f64,
    pub torque: f64,
    /// Device is currently executing a torque command
    pub executing: bool,
}

/// Command sent to the exoskeleton motor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MotorCommand {
    /// Apply a torque profile pushing the arm in `push`
    Apply {
        profile: TorqueProfile,
        assist_correct: bool,
        push: Direction,
        magnitude: f64,
    },
    /// Release torque at the end of a trial
    TrialOver,
}

impl MotorCommand {
    /// A correct command pushes toward the trial target, an incorrect one away from it
    pub fn for_trial(
        profile: TorqueProfile,
        assist_correct: bool,
        trial_direction: Direction,
        magnitude: f64,
    ) -> Self {
        let push = if assist_correct {
            trial_direction
        } else {
            trial_direction.opposite()
        };
        MotorCommand::Apply {
            profile,
            assist_correct,
            push,
            magnitude,
        }
    }

    pub fn magnitude(&self) -> f64 {
        match self {
            MotorCommand::Apply { magnitude, .. } => *magnitude,
            MotorCommand::TrialOver => 0.0,
        }
    }

    /// `[profile_code, correctness, direction_code, magnitude]`
    pub fn to_wire(&self) -> [f64; 4] {
        match self {
            MotorCommand::Apply {
                profile,
                assist_correct,
                push,
                magnitude,
            } => [
                f64::from(profile.code()),
                if *assist_correct { 1.0 } else { 0.0 },
                f64::from(push.code()),
                *magnitude,
            ],
            MotorCommand::TrialOver => [f64::from(device::TRIAL_OVER_PROFILE_CODE), 0.0, 0.0, 0.0],
        }
    }
}

/// Continuous telemetry pushed on every streamer interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub position: f64,
    pub velocity: f64,
    pub torque: f64,
    pub timestamp: f64,
}

/// Discrete trial event, pushed once per change of event code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSample {
    pub event_code: u8,
    pub event_label: String,
    pub torque_profile: Option<TorqueProfile>,
    pub torque_magnitude: f64,
    pub timestamp: f64,
}

/// Raw classifier output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedLabel {
    pub label: String,
}

impl PredictedLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

/// One-shot operator input for a controller tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputEdges {
    /// Confirm key went down this tick
    pub confirm: bool,
    /// Cancel key went down this tick
    pub cancel: bool,
    /// Pause toggle state
    pub pause_latch: bool,
}

/// Telemetry bus failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BusError {
    #[error("{0:?} outlet disconnected")]
    Disconnected(BusChannel),
    #[error("{channel:?} push timed out after {timeout_ms} ms")]
    Timeout { channel: BusChannel, timeout_ms: u64 },
    #[error("{channel:?} transport error: {reason}")]
    Transport { channel: BusChannel, reason: String },
}

impl BusError {
    pub fn channel(&self) -> BusChannel {
        match self {
            BusError::Disconnected(channel) => *channel,
            BusError::Timeout { channel, .. } | BusError::Transport { channel, .. } => *channel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_command_pushes_toward_target() {
        let command = MotorCommand::for_trial(TorqueProfile::Sinusoidal, true, Direction::Down, 2.0);
        assert_eq!(command.to_wire(), [2.0, 1.0, 20.0, 2.0]);
    }

    #[test]
    fn test_incorrect_command_pushes_away() {
        let command = MotorCommand::for_trial(TorqueProfile::Trapezoid, false, Direction::Down, 1.5);
        match command {
            MotorCommand::Apply { push, .. } => assert_eq!(push, Direction::Up),
            MotorCommand::TrialOver => panic!("Expected apply command"),
        }
        assert_eq!(command.to_wire()[2], 10.0);
    }

    #[test]
    fn test_trial_over_wire() {
        assert_eq!(MotorCommand::TrialOver.to_wire(), [99.0, 0.0, 0.0, 0.0]);
        assert_eq!(MotorCommand::TrialOver.magnitude(), 0.0);
    }

    #[test]
    fn test_bus_error_channel() {
        let err = BusError::Timeout { channel: BusChannel::Events, timeout_ms: 20 };
        assert_eq!(err.channel(), BusChannel::Events);
        assert!(err.to_string().contains("20 ms"));
    }
}

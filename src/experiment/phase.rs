// src/experiment/phase.rs
//! Controller phases and the trial event codes pushed to the bus

use crate::config::constants::{events, text};
use crate::error::{ExoError, ExoErrorBuilder};
use crate::experiment::trial::Direction;
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the trial controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Phase {
    InitialScreen = 0,
    ReturnToCenter = 1,
    InMiddleCircle = 2,
    Waiting = 3,
    Imagination = 4,
    Intention = 5,
    TrialUp = 6,
    MovingUp = 7,
    InUpperBand = 8,
    TrialDown = 9,
    MovingDown = 10,
    InLowerBand = 11,
    Failure = 12,
    Timeout = 13,
    Pause = 14,
    Exit = 15,
}

impl Phase {
    pub const ALL: [Phase; 16] = [
        Phase::InitialScreen,
        Phase::ReturnToCenter,
        Phase::InMiddleCircle,
        Phase::Waiting,
        Phase::Imagination,
        Phase::Intention,
        Phase::TrialUp,
        Phase::MovingUp,
        Phase::InUpperBand,
        Phase::TrialDown,
        Phase::MovingDown,
        Phase::InLowerBand,
        Phase::Failure,
        Phase::Timeout,
        Phase::Pause,
        Phase::Exit,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::InitialScreen => "INITIAL_SCREEN",
            Phase::ReturnToCenter => "RETURN_TO_CENTER",
            Phase::InMiddleCircle => "IN_MIDDLE_CIRCLE",
            Phase::Waiting => "WAITING",
            Phase::Imagination => "IMAGINATION",
            Phase::Intention => "INTENTION",
            Phase::TrialUp => "TRIAL_UP",
            Phase::MovingUp => "MOVING_UP",
            Phase::InUpperBand => "IN_UPPER_BAND",
            Phase::TrialDown => "TRIAL_DOWN",
            Phase::MovingDown => "MOVING_DOWN",
            Phase::InLowerBand => "IN_LOWER_BAND",
            Phase::Failure => "FAILURE",
            Phase::Timeout => "TIMEOUT",
            Phase::Pause => "PAUSE",
            Phase::Exit => "EXIT",
        }
    }

    /// Phases in which a motion deadline is running
    pub fn is_motion(self) -> bool {
        matches!(self, Phase::MovingUp | Phase::MovingDown)
    }

    /// Phases in which the trial deadline counts down, from the cue to a result
    pub fn has_deadline(self) -> bool {
        self.is_prediction_window()
    }

    /// Phases during which classifier predictions are consumed
    pub fn is_prediction_window(self) -> bool {
        matches!(
            self,
            Phase::TrialUp | Phase::MovingUp | Phase::TrialDown | Phase::MovingDown
        )
    }

    /// Phases that belong to a running trial
    pub fn is_trial_in_progress(self) -> bool {
        matches!(
            self,
            Phase::Waiting
                | Phase::Imagination
                | Phase::Intention
                | Phase::TrialUp
                | Phase::MovingUp
                | Phase::TrialDown
                | Phase::MovingDown
        )
    }

    /// Phases that hold for a sampled or fixed dwell before advancing
    pub fn has_dwell(self) -> bool {
        matches!(
            self,
            Phase::InMiddleCircle
                | Phase::Waiting
                | Phase::Imagination
                | Phase::Intention
                | Phase::InUpperBand
                | Phase::InLowerBand
                | Phase::Failure
                | Phase::Timeout
        )
    }

    pub fn trial_start(direction: Direction) -> Phase {
        match direction {
            Direction::Up => Phase::TrialUp,
            Direction::Down => Phase::TrialDown,
        }
    }

    pub fn moving(direction: Direction) -> Phase {
        match direction {
            Direction::Up => Phase::MovingUp,
            Direction::Down => Phase::MovingDown,
        }
    }

    pub fn in_band(direction: Direction) -> Phase {
        match direction {
            Direction::Up => Phase::InUpperBand,
            Direction::Down => Phase::InLowerBand,
        }
    }
}

impl TryFrom<u8> for Phase {
    type Error = ExoError;

    /// An unknown id means the controller state is corrupt; it is never recoverable.
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Phase::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| {
                ExoErrorBuilder::new("phase", "from_id")
                    .invalid_state(i64::from(value), "phase id out of range")
            })
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Discrete trial events, edge-triggered onto the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCode {
    NoEvent,
    ImagineUp,
    IntendUp,
    ExecuteUp,
    ImagineDown,
    IntendDown,
    ExecuteDown,
    Success,
    Failure,
    Timeout,
}

impl EventCode {
    pub const ALL: [EventCode; 10] = [
        EventCode::NoEvent,
        EventCode::ImagineUp,
        EventCode::IntendUp,
        EventCode::ExecuteUp,
        EventCode::ImagineDown,
        EventCode::IntendDown,
        EventCode::ExecuteDown,
        EventCode::Success,
        EventCode::Failure,
        EventCode::Timeout,
    ];

    pub fn code(self) -> u8 {
        match self {
            EventCode::NoEvent => events::NO_EVENT,
            EventCode::ImagineUp => events::IMAGINE_UP,
            EventCode::IntendUp => events::INTEND_UP,
            EventCode::ExecuteUp => events::EXECUTE_UP,
            EventCode::ImagineDown => events::IMAGINE_DOWN,
            EventCode::IntendDown => events::INTEND_DOWN,
            EventCode::ExecuteDown => events::EXECUTE_DOWN,
            EventCode::Success => events::SUCCESS,
            EventCode::Failure => events::FAILURE,
            EventCode::Timeout => events::TIMEOUT,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EventCode::NoEvent => "",
            EventCode::ImagineUp => "imagine_UP",
            EventCode::IntendUp => "intend_UP",
            EventCode::ExecuteUp => "execute_UP",
            EventCode::ImagineDown => "imagine_DOWN",
            EventCode::IntendDown => "intend_DOWN",
            EventCode::ExecuteDown => "execute_DOWN",
            EventCode::Success => text::SUCCESS,
            EventCode::Failure => text::FAILURE,
            EventCode::Timeout => text::TIMEOUT,
        }
    }

    pub fn from_code(code: u8) -> Option<EventCode> {
        EventCode::ALL.into_iter().find(|event| event.code() == code)
    }

    pub fn imagine(direction: Direction) -> EventCode {
        match direction {
            Direction::Up => EventCode::ImagineUp,
            Direction::Down => EventCode::ImagineDown,
        }
    }

    pub fn intend(direction: Direction) -> EventCode {
        match direction {
            Direction::Up => EventCode::IntendUp,
            Direction::Down => EventCode::IntendDown,
        }
    }

    pub fn execute(direction: Direction) -> EventCode {
        match direction {
            Direction::Up => EventCode::ExecuteUp,
            Direction::Down => EventCode::ExecuteDown,
        }
    }

    pub fn is_event(self) -> bool {
        self != EventCode::NoEvent
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.label(), self.code())
    }
}

/// Why the controller entered `Exit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Script exhausted
    Completed,
    /// Operator pressed cancel
    Terminated,
    /// Hardware link or a background worker was lost
    StreamOffline,
}

impl ExitReason {
    pub fn main_text(self) -> &'static str {
        match self {
            ExitReason::Completed => text::FINISHED,
            ExitReason::Terminated => text::TERMINATED,
            ExitReason::StreamOffline => text::STREAM_OFFLINE,
        }
    }

    pub fn sub_text(self) -> &'static str {
        match self {
            ExitReason::Completed => text::FINISHED_SUB,
            ExitReason::Terminated => text::TERMINATED_SUB,
            ExitReason::StreamOffline => text::STREAM_OFFLINE_SUB,
        }
    }

    /// Forced termination only allows leaving the session
    pub fn allows_restart(self) -> bool {
        self != ExitReason::Terminated
    }
}

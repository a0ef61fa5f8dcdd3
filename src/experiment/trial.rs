// src/experiment/trial.rs
//! Trial specifications and the experiment script

use crate::config::constants::{device, script};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Target direction of a trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    /// Direction code used in motor commands
    pub fn code(self) -> u8 {
        match self {
            Direction::Up => device::DIRECTION_UP_CODE,
            Direction::Down => device::DIRECTION_DOWN_CODE,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Name that does not map to a known variant
#[derive(Debug, Clone, PartialEq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for Direction {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UP" => Ok(Direction::Up),
            "DOWN" => Ok(Direction::Down),
            _ => Err(UnknownVariant { kind: "direction", value: s.to_string() }),
        }
    }
}

/// Whether device torque helps or resists the intended movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssistMode {
    Assist,
    Oppose,
}

impl FromStr for AssistMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            script::ASSIST_MODE_ASSIST => Ok(AssistMode::Assist),
            script::ASSIST_MODE_OPPOSE => Ok(AssistMode::Oppose),
            _ => Err(UnknownVariant { kind: "assist mode", value: s.to_string() }),
        }
    }
}

/// Torque waveform applied by the exoskeleton
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorqueProfile {
    Trapezoid,
    Triangular,
    Sinusoidal,
    Rectangular,
    SmoothTrapezoid,
}

impl TorqueProfile {
    pub const ALL: [TorqueProfile; 5] = [
        TorqueProfile::Trapezoid,
        TorqueProfile::Triangular,
        TorqueProfile::Sinusoidal,
        TorqueProfile::Rectangular,
        TorqueProfile::SmoothTrapezoid,
    ];

    /// Profile code used in motor commands
    pub fn code(self) -> u8 {
        match self {
            TorqueProfile::Trapezoid => 0,
            TorqueProfile::Triangular => 1,
            TorqueProfile::Sinusoidal => 2,
            TorqueProfile::Rectangular => 3,
            TorqueProfile::SmoothTrapezoid => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TorqueProfile::Trapezoid => "trapezoid",
            TorqueProfile::Triangular => "triangular",
            TorqueProfile::Sinusoidal => "sinusoidal",
            TorqueProfile::Rectangular => "rectangular",
            TorqueProfile::SmoothTrapezoid => "smooth_trapezoid",
        }
    }

    pub fn from_code(code: u8) -> Option<TorqueProfile> {
        TorqueProfile::ALL.get(code as usize).copied()
    }
}

impl FromStr for TorqueProfile {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TorqueProfile::ALL
            .into_iter()
            .find(|profile| profile.name() == s)
            .ok_or_else(|| UnknownVariant { kind: "torque profile", value: s.to_string() })
    }
}

impl fmt::Display for TorqueProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Region of the script a trial belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Block {
    Familiarization,
    Main,
    EndControl,
}

/// One generated trial; never mutated after generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSpec {
    pub direction: Direction,
    pub assist_correct: bool,
    /// `None` for familiarization and end-control trials
    pub torque_profile: Option<TorqueProfile>,
    pub torque_magnitude: f64,
    pub block: Block,
}

impl TrialSpec {
    /// Unassisted bracketing trial
    pub fn unassisted(direction: Direction, block: Block) -> Self {
        Self {
            direction,
            assist_correct: false,
            torque_profile: None,
            torque_magnitude: 0.0,
            block,
        }
    }
}

/// Ordered trials in three contiguous regions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentScript {
    trials: Vec<TrialSpec>,
    familiarization: usize,
    main: usize,
    end_control: usize,
}

impl ExperimentScript {
    pub fn new(
        familiarization: Vec<TrialSpec>,
        main: Vec<TrialSpec>,
        end_control: Vec<TrialSpec>,
    ) -> Self {
        let (familiarization_len, main_len, end_control_len) =
            (familiarization.len(), main.len(), end_control.len());
        let mut trials = familiarization;
        trials.extend(main);
        trials.extend(end_control);

        Self {
            trials,
            familiarization: familiarization_len,
            main: main_len,
            end_control: end_control_len,
        }
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn trials(&self) -> &[TrialSpec] {
        &self.trials
    }

    /// Trial by 1-based trial number
    pub fn trial(&self, number: usize) -> Option<&TrialSpec> {
        number.checked_sub(1).and_then(|index| self.trials.get(index))
    }

    pub fn familiarization(&self) -> &[TrialSpec] {
        &self.trials[..self.familiarization]
    }

    pub fn main(&self) -> &[TrialSpec] {
        &self.trials[self.familiarization..self.familiarization + self.main]
    }

    pub fn end_control(&self) -> &[TrialSpec] {
        &self.trials[self.familiarization + self.main..]
    }

    /// Motor commands may be sent for trial `number` (1-based)
    pub fn is_armed(&self, number: usize) -> bool {
        self.familiarization < number && number <= self.len().saturating_sub(self.end_control)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(fam: usize, main: usize, end: usize) -> ExperimentScript {
        let make = |n: usize, block| vec![TrialSpec::unassisted(Direction::Up, block); n];
        ExperimentScript::new(
            make(fam, Block::Familiarization),
            make(main, Block::Main),
            make(end, Block::EndControl),
        )
    }

    #[test]
    fn test_profile_names_and_codes() {
        assert_eq!("smooth_trapezoid".parse::<TorqueProfile>(), Ok(TorqueProfile::SmoothTrapezoid));
        assert_eq!(TorqueProfile::Rectangular.code(), 3);
        assert_eq!(TorqueProfile::from_code(1), Some(TorqueProfile::Triangular));
        assert!("square".parse::<TorqueProfile>().is_err());
    }

    #[test]
    fn test_assist_mode_parsing() {
        assert_eq!("assist".parse::<AssistMode>(), Ok(AssistMode::Assist));
        assert_eq!("oppose".parse::<AssistMode>(), Ok(AssistMode::Oppose));
        let err = "help".parse::<AssistMode>().unwrap_err();
        assert_eq!(err.to_string(), "unknown assist mode 'help'");
    }

    #[test]
    fn test_direction_codes() {
        assert_eq!(Direction::Up.code(), 10);
        assert_eq!(Direction::Down.code(), 20);
        assert_eq!(Direction::Up.opposite(), Direction::Down);
        assert_eq!(" down ".parse::<Direction>(), Ok(Direction::Down));
    }

    #[test]
    fn test_script_regions() {
        let script = script(2, 4, 1);
        assert_eq!(script.len(), 7);
        assert_eq!(script.familiarization().len(), 2);
        assert_eq!(script.main().len(), 4);
        assert_eq!(script.end_control().len(), 1);
        assert!(script.trial(0).is_none());
        assert!(script.trial(7).is_some());
        assert!(script.trial(8).is_none());
    }

    #[test]
    fn test_arming_window() {
        let script = script(2, 4, 1);
        let armed: Vec<usize> = (0..=8).filter(|&n| script.is_armed(n)).collect();
        assert_eq!(armed, vec![3, 4, 5, 6]);
    }
}

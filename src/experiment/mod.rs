// src/experiment/mod.rs
//! Trial script generation, the phase machine and the session loop

pub mod controller;
pub mod generator;
pub mod phase;
pub mod session;
pub mod trial;

pub use controller::{ExperimentSummary, TickInput, TickOutcome, TrialController};
pub use generator::{balanced_directions, generate, ProfileChoice};
pub use phase::{EventCode, ExitReason, Phase};
pub use session::{Collaborators, ExperimentSession, SessionStep, StateView};
pub use trial::{AssistMode, Block, Direction, ExperimentScript, TorqueProfile, TrialSpec};

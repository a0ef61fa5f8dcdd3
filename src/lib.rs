//! Exo-Trials: trial orchestration for exoskeleton motor-imagery experiments
//!
//! The crate drives a participant through a scripted sequence of trials:
//!
//! - Balanced, optionally randomized trial scripts per assist condition
//! - A fixed-rate phase machine with pause, deadlines and restart
//! - Torque commands sent once per armed trial
//! - Background telemetry and event streaming on a supervised worker
//! - Optional live decoder predictions gating the torque direction
//! - Per-participant TSV recording
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use exo_trials::config::ExperimentConfig;
//! use exo_trials::experiment::TrialController;
//! use exo_trials::streaming::SharedState;
//! use exo_trials::utils::MonotonicClock;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExperimentConfig::default();
//! let state = SharedState::new();
//! let controller = TrialController::new(
//!     config,
//!     MonotonicClock::shared(),
//!     state.control,
//!     state.prediction_receiver,
//! )?;
//! println!("{} trials scripted", controller.script().len());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod config;
pub mod error;
pub mod experiment;
pub mod hal;
pub mod recording;
pub mod streaming;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::{ConfigLoader, ExperimentConfig};
pub use error::{ExoError, ExoResult};
pub use experiment::{
    Direction, ExperimentSession, ExperimentSummary, Phase, StateView, TickInput, TrialController,
};
pub use hal::{ExoDevice, ExoSample, Frontend, InputEdges, MotorCommand, PredictionSource, TelemetryBus};
pub use recording::{NullRecorder, Recorder, SessionRecorder, TsvRecorder};

pub use utils::time::{unix_timestamp_secs, Clock, SharedClock};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: "Trial orchestration for exoskeleton motor-imagery experiments".to_string(),
        features: vec![
            "Balanced trial script generation".to_string(),
            "Fixed-rate phase machine".to_string(),
            "Supervised telemetry streaming".to_string(),
            "Live prediction gating".to_string(),
            "Per-participant recording".to_string(),
        ],
    }
}

/// Library version information
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// Library name
    pub name: String,
    /// Version string
    pub version: String,
    /// Description
    pub description: String,
    /// List of features
    pub features: Vec<String>,
}

// tests/error_propagation_tests.rs
//! Error conversion and propagation across components
//!
//! Leaf errors from the loader, the simulated device, the bus and the
//! recorder must arrive as the matching `ExoError` variant with a useful
//! display string and context.

use exo_trials::config::{ConfigError, ConfigLoader};
use exo_trials::error::{BusChannel, DeviceKind, ExoError, IntoExoError};
use exo_trials::hal::simulator::{SimulatedExo, SimulatorConfig, SimulatorError};
use exo_trials::hal::{BusError, ExoDevice, MotorCommand};
use exo_trials::recording::{Recorder, TsvRecorder};
use exo_trials::utils::ManualClock;
use exo_trials::ExperimentConfig;
use std::io::Write;
use std::path::PathBuf;

#[test]
fn test_simulator_error_conversion() {
    let clock = ManualClock::shared();
    let mut exo = SimulatedExo::new(SimulatorConfig::default(), clock).unwrap();
    exo.handle().unplug();

    let err: ExoError = exo.send_command(&MotorCommand::TrialOver).unwrap_err().into();
    match &err {
        ExoError::Device { device_kind, context, .. } => {
            assert_eq!(*device_kind, DeviceKind::Simulated);
            assert_eq!(context.component, "simulator");
        }
        other => panic!("Expected device error, got {:?}", other),
    }
    assert!(err.to_string().contains("SIMULATED-EXO"));
    assert!(!err.is_fatal());
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_invalid_simulator_config_is_rejected() {
    let config = SimulatorConfig { min_position_deg: 90.0, max_position_deg: 90.0, ..SimulatorConfig::default() };
    let err = SimulatedExo::new(config, ManualClock::shared()).err().unwrap();
    assert!(matches!(err, SimulatorError::Configuration(_)));
}

#[test]
fn test_bus_error_keeps_channel() {
    let err: ExoError = BusError::Disconnected(BusChannel::Events).into();
    match err {
        ExoError::Bus { channel, reason, .. } => {
            assert_eq!(channel, BusChannel::Events);
            assert!(reason.contains("disconnected"));
        }
        other => panic!("Expected bus error, got {:?}", other),
    }
}

#[test]
fn test_loader_error_becomes_configuration_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[device]\ntorque_limit = -2.0").unwrap();

    let mut loader = ConfigLoader::with_paths(vec![file.path().to_path_buf()]).with_env_prefix("EXO_TEST_NONE_");
    let err = loader.load().unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));

    let exo: ExoError = err.into();
    assert!(exo.is_fatal());
    assert!(exo.to_string().contains("Torque limit"));
}

#[test]
fn test_recorder_error_carries_path() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = TsvRecorder::new(dir.path(), 1).unwrap();
    // Replace the participant folder with a plain file
    std::fs::remove_dir_all(recorder.folder()).unwrap();
    std::fs::write(recorder.folder(), b"").unwrap();

    let err = recorder.record_config(&ExperimentConfig::default()).unwrap_err();
    let exo: ExoError = err.into();
    match exo {
        ExoError::Persistence { path, .. } => {
            let path = PathBuf::from(path.unwrap());
            assert!(path.starts_with(dir.path()));
        }
        other => panic!("Expected persistence error, got {:?}", other),
    }
}

#[test]
fn test_generic_errors_become_system_errors() {
    let result: Result<(), std::io::Error> = Err(std::io::Error::other("disk full"));
    let err = result.exo_err("recorder", "flush").unwrap_err();
    assert!(matches!(err, ExoError::System { .. }));
    assert_eq!(err.context().operation, "flush");
}

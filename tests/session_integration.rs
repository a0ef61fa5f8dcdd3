// tests/session_integration.rs
//! End-to-end session tests over the simulated exoskeleton
//!
//! The controller runs on a manual clock; the background workers use real
//! tickers, so checks on them poll with a deadline.

use exo_trials::config::{ConditionConfig, ExperimentConfig};
use exo_trials::experiment::{Collaborators, ExitReason, ExperimentSession, Phase, SessionStep, StateView};
use exo_trials::hal::simulator::{MemoryBus, SimulatedExo, SimulatedExoHandle, SimulatorConfig};
use exo_trials::hal::{Frontend, InputEdges, MotorCommand};
use exo_trials::recording::{NullRecorder, Recorder, TsvRecorder};
use exo_trials::streaming::SharedState;
use exo_trials::utils::{ManualClock, PositionMapper};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Default)]
struct ScriptedFrontend {
    queued: VecDeque<InputEdges>,
    phases: Vec<Phase>,
    last_view: Option<StateView>,
}

impl ScriptedFrontend {
    fn confirm(&mut self) {
        self.queued.push_back(InputEdges { confirm: true, ..InputEdges::default() });
    }

    fn cancel(&mut self) {
        self.queued.push_back(InputEdges { cancel: true, ..InputEdges::default() });
    }
}

impl Frontend for ScriptedFrontend {
    fn poll_input(&mut self) -> InputEdges {
        self.queued.pop_front().unwrap_or_default()
    }

    fn render(&mut self, view: &StateView) -> bool {
        if self.phases.last() != Some(&view.phase) {
            self.phases.push(view.phase);
        }
        self.last_view = Some(view.clone());
        true
    }
}

fn config() -> ExperimentConfig {
    let mut config = ExperimentConfig::default();
    config.experiment.familiarization_trials = 0;
    config.experiment.end_control_trials = 0;
    config.experiment.seed = Some(21);
    config.conditions = vec![ConditionConfig {
        assist_mode: "assist".to_string(),
        trials: 2,
        profile: "trapezoid".to_string(),
        magnitude: 1.0,
    }];
    config.timing.start_range_s = [0.1, 0.1];
    config.timing.wait_range_s = [0.1, 0.1];
    config.timing.imagination_range_s = [0.1, 0.1];
    config.timing.intention_range_s = [0.1, 0.1];
    config.timing.success_hold_s = 0.1;
    config.timing.failure_cooldown_s = 0.1;
    config.device.offline_miss_threshold = 3;
    config.device.offline_debounce_ms = 100;
    config
}

struct Rig<R: Recorder> {
    session: ExperimentSession<SimulatedExo, ScriptedFrontend, R>,
    clock: Arc<ManualClock>,
    arm: SimulatedExoHandle,
    mapper: PositionMapper,
    bus: MemoryBus,
}

fn rig<R: Recorder>(config: ExperimentConfig, recorder: R) -> Rig<R> {
    let clock = ManualClock::shared();
    let device = SimulatedExo::new(SimulatorConfig::default(), clock.clone()).unwrap();
    let arm = device.handle();
    let bus = MemoryBus::new();
    let mapper = PositionMapper::new(config.geometry.clone());

    let collaborators = Collaborators {
        device,
        frontend: ScriptedFrontend::default(),
        recorder,
        bus: Box::new(bus.clone()),
        predictions: None,
    };
    let session = ExperimentSession::new(config, clock.clone(), SharedState::new(), collaborators).unwrap();
    Rig { session, clock, arm, mapper, bus }
}

impl<R: Recorder> Rig<R> {
    /// Participant steers toward the cued band during a trial and back to the centre otherwise
    fn step(&mut self) -> SessionStep {
        let controller = self.session.controller();
        let phase = controller.phase();
        let target = if phase.is_prediction_window() || phase.is_motion() {
            controller.current_trial().map(|trial| trial.direction)
        } else {
            None
        };
        self.arm.set_target_deg(self.mapper.target_angle(target));

        self.clock.advance_by(Duration::from_millis(50));
        self.session.step().unwrap()
    }

    fn step_until(&mut self, max_steps: usize, done: impl Fn(Phase) -> bool) -> bool {
        for _ in 0..max_steps {
            self.step();
            if done(self.session.controller().phase()) {
                return true;
            }
        }
        false
    }
}

#[test]
fn test_session_runs_script_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = TsvRecorder::new(dir.path(), 3).unwrap();
    let mut rig = rig(config(), recorder);

    rig.session.frontend_mut().confirm();
    assert!(rig.step_until(2000, |phase| phase == Phase::Exit));

    let controller = rig.session.controller();
    assert_eq!(controller.exit_reason(), Some(ExitReason::Completed));
    let summary = controller.summary();
    assert_eq!(summary.success_count, 2);
    assert!(summary.avg_time.is_some());

    let commands = rig.arm.commands();
    let applied = commands.iter().filter(|c| matches!(c, MotorCommand::Apply { .. })).count();
    assert_eq!(applied, 2);
    assert_eq!(commands.last(), Some(&MotorCommand::TrialOver));

    let view = rig.session.frontend().last_view.clone().unwrap();
    assert_eq!(view.main_text, "EXPERIMENT FINISHED");
    assert_eq!(view.summary.map(|s| s.success_count), Some(2));

    let phases = &rig.session.frontend().phases;
    assert!(phases.contains(&Phase::Imagination));
    assert!(phases.contains(&Phase::Intention));

    rig.session.frontend_mut().cancel();
    assert_eq!(rig.step(), SessionStep::Stop);

    // Give the telemetry worker a few of its own ticks
    let deadline = Instant::now() + Duration::from_secs(2);
    while rig.bus.telemetry_count() == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(rig.bus.telemetry_count() > 0);

    assert!(rig.session.recorder().rows_written() > 0);
    rig.session.shutdown();
    let folder = dir.path().join("participant_003");
    assert!(folder.join("experiment_config00.json").exists());
    let data = std::fs::read_to_string(folder.join("experiment_data_00.tsv")).unwrap();
    assert!(data.lines().count() > 10);
    assert!(data.contains("MOVING_"));
}

#[test]
fn test_unplugged_arm_goes_offline_and_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = TsvRecorder::new(dir.path(), 4).unwrap();
    let mut rig = rig(config(), recorder);

    rig.session.frontend_mut().confirm();
    assert!(rig.step_until(200, |phase| phase.is_prediction_window()));

    rig.arm.unplug();
    assert!(rig.step_until(20, |phase| phase == Phase::Exit));
    assert_eq!(rig.session.controller().exit_reason(), Some(ExitReason::StreamOffline));
    assert!(!rig.session.is_stream_online());

    // Confirm is refused while the link is still down
    rig.session.frontend_mut().confirm();
    rig.step();
    assert_eq!(rig.session.controller().phase(), Phase::Exit);

    rig.arm.plug();
    rig.step();
    assert!(rig.session.is_stream_online());
    rig.session.frontend_mut().confirm();
    rig.step();
    assert_eq!(rig.session.controller().phase(), Phase::InitialScreen);
    assert_eq!(rig.session.controller().trial_index(), 0);

    rig.session.shutdown();
    let folder = dir.path().join("participant_004");
    assert!(folder.join("experiment_data_01.tsv").exists());
    assert!(folder.join("experiment_config01.json").exists());
}

#[test]
fn test_lost_telemetry_worker_is_treated_as_offline() {
    let mut rig = rig(config(), NullRecorder);
    rig.session.frontend_mut().confirm();
    rig.step();

    rig.bus.disconnect();
    let deadline = Instant::now() + Duration::from_secs(5);
    while rig.session.controller().phase() != Phase::Exit && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
        rig.step();
    }
    assert_eq!(rig.session.controller().exit_reason(), Some(ExitReason::StreamOffline));

    rig.bus.reconnect();
    rig.session.frontend_mut().confirm();
    rig.step();
    assert_eq!(rig.session.controller().phase(), Phase::InitialScreen);
    assert!(rig.session.is_stream_online());

    let before = rig.bus.telemetry_count();
    let deadline = Instant::now() + Duration::from_secs(2);
    while rig.bus.telemetry_count() == before && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(rig.bus.telemetry_count() > before);
}

#[test]
fn test_live_prediction_requires_source() {
    let mut config = config();
    config.experiment.live_prediction = true;

    let clock = ManualClock::shared();
    let device = SimulatedExo::new(SimulatorConfig::default(), clock.clone()).unwrap();
    let collaborators = Collaborators {
        device,
        frontend: ScriptedFrontend::default(),
        recorder: NullRecorder,
        bus: Box::new(MemoryBus::new()),
        predictions: None,
    };

    let result = ExperimentSession::new(config, clock, SharedState::new(), collaborators);
    assert!(result.is_err());
}

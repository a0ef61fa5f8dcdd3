// src/experiment/controller.rs
//! Trial state machine
//!
//! One [`TrialController::tick`] evaluates forced transitions (exit, link
//! loss, termination), then the pause overlay, then a single phase step.
//! Dwell and deadline arithmetic is done in `Duration`s read from one shared
//! clock; all controller-owned shared fields are published once per tick.

use crate::config::constants::text;
use crate::config::ExperimentConfig;
use crate::error::{ExoError, ExoErrorBuilder, ExoResult};
use crate::experiment::generator;
use crate::experiment::phase::{EventCode, ExitReason, Phase};
use crate::experiment::trial::{Direction, ExperimentScript, TrialSpec};
use crate::hal::{ExoDevice, InputEdges, MotorCommand};
use crate::streaming::shared_state::{ControlReader, ControlSnapshot, ControlWriter, PredictionReceiver};
use crate::utils::geometry::Zones;
use crate::utils::time::SharedClock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Everything the controller observes on one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickInput {
    pub edges: InputEdges,
    pub zones: Zones,
    pub stream_online: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// Operator restarted from the exit screen
    Restarted,
    /// Operator left the exit screen; the outer loop should stop
    ExperimentOver,
}

/// Result statistics shown on the exit screen
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentSummary {
    /// Mean completion time of successful trials in seconds
    pub avg_time: Option<f64>,
    pub success_count: usize,
    pub total_trials: usize,
}

/// State saved when entering the pause overlay
#[derive(Debug, Clone, Copy)]
struct PauseSnapshot {
    phase: Phase,
    direction: Option<Direction>,
    event: EventCode,
    remaining_dwell: Duration,
    /// Remaining motion deadline, only when one was running
    deadline_budget: Option<Duration>,
}

pub struct TrialController {
    config: ExperimentConfig,
    clock: SharedClock,
    rng: StdRng,
    script: ExperimentScript,

    phase: Phase,
    exit_reason: Option<ExitReason>,
    run: u64,
    trial_index: usize,
    trial: Option<TrialSpec>,
    event: EventCode,

    phase_entered: Duration,
    dwell: Duration,
    trial_started: Duration,
    deadline_budget: Duration,
    remaining: Option<Duration>,

    command_latched: bool,
    last_prediction: Option<Direction>,
    commands_sent: u64,
    last_command_error: Option<ExoError>,
    completion_times: Vec<Duration>,
    pause: Option<PauseSnapshot>,
    pause_baseline: bool,

    control: ControlWriter,
    predictions: PredictionReceiver,
}

impl TrialController {
    pub fn new(
        config: ExperimentConfig,
        clock: SharedClock,
        control: ControlWriter,
        predictions: PredictionReceiver,
    ) -> ExoResult<Self> {
        let mut rng = match config.experiment.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let script = generator::generate(&config, &mut rng)?;
        Ok(Self::with_script(config, clock, control, predictions, script, rng))
    }

    /// Controller over a prepared script
    pub fn with_script(
        config: ExperimentConfig,
        clock: SharedClock,
        control: ControlWriter,
        predictions: PredictionReceiver,
        script: ExperimentScript,
        rng: StdRng,
    ) -> Self {
        let now = clock.now();
        let deadline_budget = config.trial_timeout();
        let mut controller = Self {
            config,
            clock,
            rng,
            script,
            phase: Phase::InitialScreen,
            exit_reason: None,
            run: 0,
            trial_index: 0,
            trial: None,
            event: EventCode::NoEvent,
            phase_entered: now,
            dwell: Duration::ZERO,
            trial_started: now,
            deadline_budget,
            remaining: None,
            command_latched: false,
            last_prediction: None,
            commands_sent: 0,
            last_command_error: None,
            completion_times: Vec::new(),
            pause: None,
            pause_baseline: false,
            control,
            predictions,
        };
        controller.publish();
        controller
    }

    pub fn tick<D: ExoDevice>(&mut self, input: &TickInput, device: &mut D) -> ExoResult<TickOutcome> {
        let now = self.clock.now();
        let outcome = self.step(input, device, now)?;
        self.publish();
        Ok(outcome)
    }

    fn step<D: ExoDevice>(&mut self, input: &TickInput, device: &mut D, now: Duration) -> ExoResult<TickOutcome> {
        let edges = input.edges;

        if self.phase == Phase::Exit {
            return self.step_exit(input, now);
        }
        if !input.stream_online {
            self.force_exit(ExitReason::StreamOffline, edges, device, now);
            return Ok(TickOutcome::Continue);
        }
        if edges.cancel {
            self.force_exit(ExitReason::Terminated, edges, device, now);
            return Ok(TickOutcome::Continue);
        }

        let pause_requested = edges.pause_latch != self.pause_baseline;
        if self.phase == Phase::Pause {
            if !pause_requested {
                self.resume(now);
            }
            return Ok(TickOutcome::Continue);
        }
        if pause_requested {
            self.enter_pause(now);
            return Ok(TickOutcome::Continue);
        }

        self.step_phase(input, device, now)?;
        Ok(TickOutcome::Continue)
    }

    fn step_exit(&mut self, input: &TickInput, now: Duration) -> ExoResult<TickOutcome> {
        if input.edges.cancel {
            info!(reason = ?self.exit_reason, "Experiment over");
            return Ok(TickOutcome::ExperimentOver);
        }
        if !input.stream_online && self.exit_reason == Some(ExitReason::Completed) {
            self.exit_reason = Some(ExitReason::StreamOffline);
        }
        let can_restart = self.exit_reason.map_or(true, ExitReason::allows_restart);
        if input.edges.confirm && can_restart && input.stream_online {
            self.restart(input.edges, now)?;
            return Ok(TickOutcome::Restarted);
        }
        Ok(TickOutcome::Continue)
    }

    fn restart(&mut self, edges: InputEdges, now: Duration) -> ExoResult<()> {
        if self.config.experiment.regenerate_on_restart {
            self.script = generator::generate(&self.config, &mut self.rng)?;
        }
        self.run += 1;
        self.trial_index = 0;
        self.trial = None;
        self.completion_times.clear();
        self.exit_reason = None;
        self.pause = None;
        self.pause_baseline = edges.pause_latch;
        self.command_latched = false;
        self.predictions.clear();
        self.enter(Phase::InitialScreen, EventCode::NoEvent, Duration::ZERO, now);
        info!(run = self.run, trials = self.script.len(), "Experiment restarted");
        Ok(())
    }

    fn force_exit<D: ExoDevice>(&mut self, reason: ExitReason, edges: InputEdges, device: &mut D, now: Duration) {
        if self.command_latched {
            self.send(device, &MotorCommand::TrialOver);
            self.command_latched = false;
        }
        if self.phase == Phase::Pause {
            self.pause = None;
        }
        self.pause_baseline = edges.pause_latch;
        warn!(reason = ?reason, phase = %self.phase, trial = self.trial_index, "Forced exit");
        self.exit(reason, now);
    }

    fn exit(&mut self, reason: ExitReason, now: Duration) {
        self.exit_reason = Some(reason);
        self.trial = None;
        self.enter(Phase::Exit, EventCode::NoEvent, Duration::ZERO, now);
        if reason == ExitReason::Completed {
            let summary = self.summary();
            info!(
                avg_time = ?summary.avg_time,
                successes = summary.success_count,
                trials = summary.total_trials,
                "Experiment finished"
            );
        }
    }

    fn enter_pause(&mut self, now: Duration) {
        let elapsed = now.saturating_sub(self.phase_entered);
        let deadline_budget = self
            .phase
            .has_deadline()
            .then(|| self.deadline_budget.saturating_sub(now.saturating_sub(self.trial_started)));

        self.pause = Some(PauseSnapshot {
            phase: self.phase,
            direction: self.trial.as_ref().map(|trial| trial.direction),
            event: self.event,
            remaining_dwell: self.dwell.saturating_sub(elapsed),
            deadline_budget,
        });
        info!(phase = %self.phase, remaining = ?deadline_budget, "Paused");
        self.phase = Phase::Pause;
        self.event = EventCode::NoEvent;
    }

    fn resume(&mut self, now: Duration) {
        let Some(snapshot) = self.pause.take() else {
            // Nothing to restore
            self.enter(Phase::ReturnToCenter, EventCode::NoEvent, Duration::ZERO, now);
            return;
        };

        self.phase = snapshot.phase;
        self.event = snapshot.event;
        self.phase_entered = now;
        self.dwell = snapshot.remaining_dwell;
        if let Some(budget) = snapshot.deadline_budget {
            self.trial_started = now;
            self.deadline_budget = budget;
            self.remaining = Some(budget);
        }
        info!(phase = %self.phase, direction = ?snapshot.direction, "Resumed");
    }

    fn step_phase<D: ExoDevice>(&mut self, input: &TickInput, device: &mut D, now: Duration) -> ExoResult<()> {
        let zones = input.zones;
        let dwell_elapsed = now.saturating_sub(self.phase_entered) >= self.dwell;

        match self.phase {
            Phase::InitialScreen => {
                if input.edges.confirm {
                    info!(trials = self.script.len(), "Experiment started");
                    self.enter(Phase::ReturnToCenter, EventCode::NoEvent, Duration::ZERO, now);
                }
            }
            Phase::ReturnToCenter => {
                if zones.in_middle {
                    let dwell = self.sample_dwell(self.config.timing.start_range_s);
                    self.enter(Phase::InMiddleCircle, EventCode::NoEvent, dwell, now);
                }
            }
            Phase::InMiddleCircle => {
                if !zones.in_middle {
                    self.enter(Phase::ReturnToCenter, EventCode::NoEvent, Duration::ZERO, now);
                } else if dwell_elapsed {
                    self.start_next_trial(now);
                }
            }
            Phase::Waiting => {
                if dwell_elapsed {
                    let direction = self.trial_direction()?;
                    let dwell = self.sample_dwell(self.config.timing.imagination_range_s);
                    self.enter(Phase::Imagination, EventCode::imagine(direction), dwell, now);
                }
            }
            Phase::Imagination => {
                if dwell_elapsed {
                    let direction = self.trial_direction()?;
                    let dwell = self.sample_dwell(self.config.timing.intention_range_s);
                    self.enter(Phase::Intention, EventCode::intend(direction), dwell, now);
                }
            }
            Phase::Intention => {
                if dwell_elapsed {
                    let direction = self.trial_direction()?;
                    self.trial_started = now;
                    self.deadline_budget = self.config.trial_timeout();
                    self.remaining = Some(self.deadline_budget);
                    self.enter(Phase::trial_start(direction), EventCode::execute(direction), Duration::ZERO, now);
                }
            }
            Phase::TrialUp | Phase::TrialDown => {
                let direction = self.trial_direction()?;
                if !zones.in_middle {
                    self.enter(Phase::moving(direction), self.event, Duration::ZERO, now);
                    self.try_command(device);
                } else {
                    self.check_deadline(device, now);
                }
            }
            Phase::MovingUp | Phase::MovingDown => {
                let direction = self.trial_direction()?;
                self.try_command(device);
                if zones.in_band(direction) {
                    self.succeed(device, now);
                } else if zones.in_band(direction.opposite()) {
                    self.fail(device, now);
                } else {
                    self.check_deadline(device, now);
                }
            }
            Phase::InUpperBand | Phase::InLowerBand | Phase::Failure | Phase::Timeout => {
                if dwell_elapsed {
                    self.finish_trial(now);
                }
            }
            // Handled before the phase step
            Phase::Pause | Phase::Exit => {}
        }
        Ok(())
    }

    fn start_next_trial(&mut self, now: Duration) {
        let next = self.trial_index + 1;
        let Some(trial) = self.script.trial(next).cloned() else {
            self.exit(ExitReason::Completed, now);
            return;
        };

        self.trial_index = next;
        self.command_latched = false;
        self.last_prediction = None;
        self.remaining = None;
        self.predictions.clear();
        info!(
            trial = next,
            of = self.script.len(),
            direction = %trial.direction,
            armed = self.script.is_armed(next),
            "Trial started"
        );
        self.trial = Some(trial);
        let dwell = self.sample_dwell(self.config.timing.wait_range_s);
        self.enter(Phase::Waiting, EventCode::NoEvent, dwell, now);
    }

    fn finish_trial(&mut self, now: Duration) {
        self.trial = None;
        if self.trial_index >= self.script.len() {
            self.exit(ExitReason::Completed, now);
        } else {
            self.enter(Phase::ReturnToCenter, EventCode::NoEvent, Duration::ZERO, now);
        }
    }

    fn trial_direction(&self) -> ExoResult<Direction> {
        self.trial.as_ref().map(|trial| trial.direction).ok_or_else(|| {
            ExoErrorBuilder::new("controller", "step")
                .invalid_state(i64::from(self.phase.id()), "trial phase without a current trial")
        })
    }

    /// Elapsed motion time including time consumed before a pause
    fn motion_elapsed(&self, now: Duration) -> Duration {
        let consumed_before_pause = self.config.trial_timeout().saturating_sub(self.deadline_budget);
        consumed_before_pause + now.saturating_sub(self.trial_started)
    }

    fn check_deadline<D: ExoDevice>(&mut self, device: &mut D, now: Duration) {
        let elapsed = now.saturating_sub(self.trial_started);
        let remaining = self.deadline_budget.saturating_sub(elapsed);
        self.remaining = Some(remaining);
        if remaining.is_zero() {
            info!(trial = self.trial_index, "Trial timed out");
            self.end_motion(Phase::Timeout, EventCode::Timeout, self.config.failure_cooldown(), device, now);
        }
    }

    fn succeed<D: ExoDevice>(&mut self, device: &mut D, now: Duration) {
        let completion = self.motion_elapsed(now);
        self.completion_times.push(completion);
        info!(trial = self.trial_index, seconds = completion.as_secs_f64(), "Trial succeeded");

        let band = match self.phase {
            Phase::MovingDown => Phase::InLowerBand,
            _ => Phase::InUpperBand,
        };
        self.end_motion(band, EventCode::Success, self.config.success_hold(), device, now);
    }

    fn fail<D: ExoDevice>(&mut self, device: &mut D, now: Duration) {
        info!(trial = self.trial_index, "Trial failed, opposite band reached");
        self.end_motion(Phase::Failure, EventCode::Failure, self.config.failure_cooldown(), device, now);
    }

    fn end_motion<D: ExoDevice>(&mut self, phase: Phase, event: EventCode, dwell: Duration, device: &mut D, now: Duration) {
        self.send(device, &MotorCommand::TrialOver);
        self.command_latched = false;
        self.remaining = None;
        self.enter(phase, event, dwell, now);
    }

    /// Issue at most one torque command per armed trial
    fn try_command<D: ExoDevice>(&mut self, device: &mut D) {
        if self.command_latched || !self.script.is_armed(self.trial_index) {
            return;
        }
        let Some(trial) = self.trial.clone() else {
            return;
        };
        let Some(profile) = trial.torque_profile else {
            warn!(trial = self.trial_index, "Armed trial without a torque profile");
            self.command_latched = true;
            return;
        };

        let assist_correct = if self.config.experiment.live_prediction {
            match self.predictions.take_for(self.trial_index) {
                Some(prediction) => {
                    self.last_prediction = Some(prediction.direction);
                    prediction.direction == trial.direction
                }
                None => return,
            }
        } else {
            trial.assist_correct
        };

        let command = MotorCommand::for_trial(profile, assist_correct, trial.direction, trial.torque_magnitude);
        self.command_latched = true;
        info!(
            trial = self.trial_index,
            profile = %profile,
            assist_correct,
            magnitude = trial.torque_magnitude,
            "Torque command issued"
        );
        self.send(device, &command);
    }

    fn send<D: ExoDevice>(&mut self, device: &mut D, command: &MotorCommand) {
        match device.send_command(command) {
            Ok(()) => self.commands_sent += 1,
            Err(err) => {
                let context = crate::error_context!("controller", "send_command")
                    .add_info("run", self.run.to_string())
                    .add_info("trial", self.trial_index.to_string())
                    .add_info("phase", self.phase.name());
                let err = ExoError::device(device.device_kind(), err, context);
                warn!(error = %err, command = ?command.to_wire(), "Device command failed");
                self.last_command_error = Some(err);
            }
        }
    }

    fn sample_dwell(&mut self, [min, max]: [f64; 2]) -> Duration {
        let seconds = if max > min { self.rng.gen_range(min..=max) } else { min };
        Duration::from_secs_f64(seconds.max(0.0))
    }

    fn enter(&mut self, phase: Phase, event: EventCode, dwell: Duration, now: Duration) {
        if phase != self.phase {
            debug!(from = %self.phase, to = %phase, trial = self.trial_index, "Phase transition");
        }
        self.phase = phase;
        self.event = event;
        self.dwell = dwell;
        self.phase_entered = now;
        if !phase.has_deadline() && !matches!(phase, Phase::Pause) {
            self.remaining = None;
        }
    }

    fn control_snapshot(&self) -> ControlSnapshot {
        let trial_phase = match (self.phase, self.pause.as_ref()) {
            (Phase::Pause, Some(snapshot)) => snapshot.phase,
            (phase, _) => phase,
        };
        let armed = self.script.is_armed(self.trial_index);
        let torque = self.trial.as_ref().filter(|_| armed);

        ControlSnapshot {
            phase: self.phase,
            run: self.run,
            trial_index: self.trial_index,
            trial_direction: self.trial.as_ref().map(|trial| trial.direction),
            event: self.event,
            trial_in_progress: trial_phase.is_trial_in_progress(),
            remaining_time: self.remaining.map(|remaining| remaining.as_secs_f64()),
            deadline_budget: self.deadline_budget.as_secs_f64(),
            exo_armed: armed,
            torque_profile: torque.and_then(|trial| trial.torque_profile),
            torque_magnitude: torque.map_or(0.0, |trial| trial.torque_magnitude),
        }
    }

    fn publish(&mut self) {
        let snapshot = self.control_snapshot();
        self.control.publish(&snapshot);
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.exit_reason
    }

    pub fn trial_index(&self) -> usize {
        self.trial_index
    }

    pub fn current_trial(&self) -> Option<&TrialSpec> {
        self.trial.as_ref()
    }

    pub fn script(&self) -> &ExperimentScript {
        &self.script
    }

    pub fn deadline_budget(&self) -> Duration {
        self.deadline_budget
    }

    pub fn remaining_time(&self) -> Option<Duration> {
        self.remaining
    }

    pub fn completion_times(&self) -> &[Duration] {
        &self.completion_times
    }

    /// Prediction consumed for the current trial in live mode
    pub fn last_prediction(&self) -> Option<Direction> {
        self.last_prediction
    }

    pub fn commands_sent(&self) -> u64 {
        self.commands_sent
    }

    /// Most recent device command failure, with run and trial in its context
    pub fn last_command_error(&self) -> Option<&ExoError> {
        self.last_command_error.as_ref()
    }

    /// Number of restarts since the controller was created
    pub fn run(&self) -> u64 {
        self.run
    }

    pub fn is_paused(&self) -> bool {
        self.phase == Phase::Pause
    }

    pub fn control_reader(&self) -> ControlReader {
        self.control.reader()
    }

    pub fn summary(&self) -> ExperimentSummary {
        let success_count = self.completion_times.len();
        let avg_time = (success_count > 0).then(|| {
            let total: Duration = self.completion_times.iter().sum();
            total.as_secs_f64() / success_count as f64
        });
        ExperimentSummary {
            avg_time,
            success_count,
            total_trials: self.script.len(),
        }
    }

    /// Main and sub text for the current screen
    pub fn screen_text(&self) -> (&'static str, &'static str) {
        match self.phase {
            Phase::InitialScreen => (text::INITIAL, ""),
            Phase::InUpperBand | Phase::InLowerBand => (text::SUCCESS, ""),
            Phase::Failure => (text::FAILURE, ""),
            Phase::Timeout => (text::TIMEOUT, ""),
            Phase::Pause => (text::PAUSED, ""),
            Phase::Exit => self
                .exit_reason
                .map_or(("", ""), |reason| (reason.main_text(), reason.sub_text())),
            _ => ("", ""),
        }
    }
}

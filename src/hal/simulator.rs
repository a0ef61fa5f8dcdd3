// src/hal/simulator.rs
//! Simulated collaborators: an exoskeleton arm, an in-memory bus and a synthetic decoder
//!
//! The simulated arm follows an operator-set target angle at a bounded speed;
//! an applied motor command adds a drift in its push direction until the
//! trial-over command arrives. Decreasing angle moves the arm UP.

use crate::error::{BusChannel, DeviceKind};
use crate::experiment::trial::Direction;
use crate::hal::traits::{ExoDevice, PredictionSource, TelemetryBus};
use crate::hal::types::{BusError, EventSample, ExoSample, MotorCommand, PredictedLabel, TelemetrySample};
use crate::streaming::ControlReader;
use crate::utils::time::SharedClock;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

/// Simulated arm parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulatorConfig {
    pub min_position_deg: f64,
    pub max_position_deg: f64,
    /// Voluntary movement speed toward the target
    pub max_speed_deg_s: f64,
    /// Drift speed per unit of commanded torque
    pub torque_gain_deg_s: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            min_position_deg: crate::config::geometry::DEFAULT_MIN_POSITION_DEG,
            max_position_deg: crate::config::geometry::DEFAULT_MAX_POSITION_DEG,
            max_speed_deg_s: 90.0,
            torque_gain_deg_s: 10.0,
        }
    }
}

/// Simulator errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulatorError {
    #[error("simulated exoskeleton is unplugged")]
    Unplugged,
    #[error("invalid simulator configuration: {0}")]
    Configuration(String),
}

#[derive(Debug)]
struct ArmState {
    target_bits: AtomicU64,
    plugged: AtomicBool,
    commands: Mutex<Vec<MotorCommand>>,
}

/// Operator handle that moves the simulated participant's arm
#[derive(Debug, Clone)]
pub struct SimulatedExoHandle {
    state: Arc<ArmState>,
}

impl SimulatedExoHandle {
    pub fn set_target_deg(&self, degrees: f64) {
        self.state.target_bits.store(degrees.to_bits(), Ordering::Relaxed);
    }

    pub fn target_deg(&self) -> f64 {
        f64::from_bits(self.state.target_bits.load(Ordering::Relaxed))
    }

    /// Simulate losing the link
    pub fn unplug(&self) {
        self.state.plugged.store(false, Ordering::Relaxed);
    }

    pub fn plug(&self) {
        self.state.plugged.store(true, Ordering::Relaxed);
    }

    /// Commands received so far
    pub fn commands(&self) -> Vec<MotorCommand> {
        self.state.commands.lock().clone()
    }
}

/// Simulated exoskeleton arm
pub struct SimulatedExo {
    config: SimulatorConfig,
    state: Arc<ArmState>,
    clock: SharedClock,
    last_step: Duration,
    position: f64,
    velocity: f64,
    active: Option<MotorCommand>,
}

impl SimulatedExo {
    pub fn new(config: SimulatorConfig, clock: SharedClock) -> Result<Self, SimulatorError> {
        if config.max_position_deg <= config.min_position_deg {
            return Err(SimulatorError::Configuration(format!(
                "empty position range [{}, {}]",
                config.min_position_deg, config.max_position_deg
            )));
        }
        if !(config.max_speed_deg_s > 0.0) {
            return Err(SimulatorError::Configuration("max speed must be positive".to_string()));
        }

        let center = (config.min_position_deg + config.max_position_deg) / 2.0;
        let now = clock.now();
        Ok(Self {
            state: Arc::new(ArmState {
                target_bits: AtomicU64::new(center.to_bits()),
                plugged: AtomicBool::new(true),
                commands: Mutex::new(Vec::new()),
            }),
            config,
            clock,
            last_step: now,
            position: center,
            velocity: 0.0,
            active: None,
        })
    }

    pub fn handle(&self) -> SimulatedExoHandle {
        SimulatedExoHandle { state: Arc::clone(&self.state) }
    }

    fn step(&mut self) {
        let now = self.clock.now();
        let dt = now.saturating_sub(self.last_step).as_secs_f64();
        self.last_step = now;
        if dt <= 0.0 {
            return;
        }

        let target = f64::from_bits(self.state.target_bits.load(Ordering::Relaxed));
        let max_step = self.config.max_speed_deg_s * dt;
        let voluntary = (target - self.position).clamp(-max_step, max_step);

        let drift = match self.active {
            Some(MotorCommand::Apply { push, magnitude, .. }) => {
                let sign = match push {
                    Direction::Up => -1.0,
                    Direction::Down => 1.0,
                };
                sign * magnitude * self.config.torque_gain_deg_s * dt
            }
            _ => 0.0,
        };

        let previous = self.position;
        self.position = (self.position + voluntary + drift)
            .clamp(self.config.min_position_deg, self.config.max_position_deg);
        self.velocity = (self.position - previous) / dt;
    }
}

impl ExoDevice for SimulatedExo {
    type Error = SimulatorError;

    fn read_sample(&mut self, _timeout: Duration) -> Result<Option<ExoSample>, Self::Error> {
        if !self.state.plugged.load(Ordering::Relaxed) {
            return Ok(None);
        }
        self.step();

        let torque = self.active.map(|command| command.magnitude()).unwrap_or(0.0);
        let sample = ExoSample {
            position: self.position,
            velocity: self.velocity,
            torque,
            executing: self.active.is_some(),
        };
        trace!(position = sample.position, torque, "Simulated sample");
        Ok(Some(sample))
    }

    fn send_command(&mut self, command: &MotorCommand) -> Result<(), Self::Error> {
        if !self.state.plugged.load(Ordering::Relaxed) {
            return Err(SimulatorError::Unplugged);
        }
        debug!(wire = ?command.to_wire(), "Simulated exoskeleton command");
        self.state.commands.lock().push(*command);
        self.active = match command {
            MotorCommand::Apply { .. } => Some(*command),
            MotorCommand::TrialOver => None,
        };
        Ok(())
    }

    fn device_kind(&self) -> DeviceKind {
        DeviceKind::Simulated
    }
}

#[derive(Debug, Default)]
struct BusLog {
    telemetry: Vec<TelemetrySample>,
    events: Vec<EventSample>,
    disconnected: bool,
}

/// In-memory telemetry bus; clones share the same log
#[derive(Debug, Clone, Default)]
pub struct MemoryBus {
    log: Arc<Mutex<BusLog>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn telemetry(&self) -> Vec<TelemetrySample> {
        self.log.lock().telemetry.clone()
    }

    pub fn telemetry_count(&self) -> usize {
        self.log.lock().telemetry.len()
    }

    pub fn events(&self) -> Vec<EventSample> {
        self.log.lock().events.clone()
    }

    /// Make every following push fail
    pub fn disconnect(&self) {
        self.log.lock().disconnected = true;
    }

    pub fn reconnect(&self) {
        self.log.lock().disconnected = false;
    }
}

impl TelemetryBus for MemoryBus {
    fn push_telemetry(&mut self, sample: &TelemetrySample) -> Result<(), BusError> {
        let mut log = self.log.lock();
        if log.disconnected {
            return Err(BusError::Disconnected(BusChannel::Telemetry));
        }
        log.telemetry.push(*sample);
        Ok(())
    }

    fn push_event(&mut self, event: &EventSample) -> Result<(), BusError> {
        let mut log = self.log.lock();
        if log.disconnected {
            return Err(BusError::Disconnected(BusChannel::Events));
        }
        log.events.push(event.clone());
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SyntheticPayload<'a> {
    classifier_name: &'a str,
    predicted_event_name: &'a str,
    true_event_name: &'a str,
}

/// Prediction source that labels the running trial with a configurable accuracy
pub struct SyntheticDecoder {
    control: ControlReader,
    accuracy: f64,
    rng: StdRng,
}

impl SyntheticDecoder {
    pub fn new(control: ControlReader, accuracy: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            control,
            accuracy: accuracy.clamp(0.0, 1.0),
            rng,
        }
    }
}

impl PredictionSource for SyntheticDecoder {
    fn poll_prediction(&mut self, _timeout: Duration) -> Result<Option<PredictedLabel>, BusError> {
        let Some(direction) = self.control.trial_direction() else {
            return Ok(None);
        };
        let predicted = if self.rng.gen_bool(self.accuracy) {
            direction
        } else {
            direction.opposite()
        };

        let payload = SyntheticPayload {
            classifier_name: "synthetic",
            predicted_event_name: predicted.label(),
            true_event_name: direction.label(),
        };
        let json = serde_json::to_string(&payload).map_err(|e| BusError::Transport {
            channel: BusChannel::Predictions,
            reason: e.to_string(),
        })?;
        Ok(Some(PredictedLabel::new(json)))
    }
}

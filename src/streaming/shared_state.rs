// src/streaming/shared_state.rs
//! Typed single-writer handles over the shared experiment record
//!
//! Each field group has exactly one writer type, and none of the writer
//! types implement `Clone`:
//!
//! - [`ControlWriter`]: owned by the trial controller
//! - [`SensorWriter`]: owned by the session's hardware-input step
//! - [`TimestampPublisher`]: owned by the telemetry streamer
//! - [`PredictionSender`]: owned by the prediction consumer
//!
//! Readers are cheap to clone. Control and sensor fields are atomics; the bus
//! timestamp is the only field behind a lock.

use crate::error::ExoResult;
use crate::experiment::phase::{EventCode, Phase};
use crate::experiment::trial::{Direction, TorqueProfile};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

const NO_DIRECTION: u8 = 0;
const NO_PROFILE: u8 = u8::MAX;

fn direction_to_u8(direction: Option<Direction>) -> u8 {
    match direction {
        None => NO_DIRECTION,
        Some(direction) => direction.code(),
    }
}

fn direction_from_u8(value: u8) -> Option<Direction> {
    [Direction::Up, Direction::Down]
        .into_iter()
        .find(|direction| direction.code() == value)
}

/// f64 stored as bits
#[derive(Debug, Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// Controller-owned fields as of one tick
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSnapshot {
    pub phase: Phase,
    /// Bumped on every restart so trial numbers from different runs never collide
    pub run: u64,
    /// 1-based number of the current trial, 0 before the first
    pub trial_index: usize,
    pub trial_direction: Option<Direction>,
    pub event: EventCode,
    pub trial_in_progress: bool,
    /// Seconds left on the motion deadline, when one is running
    pub remaining_time: Option<f64>,
    pub deadline_budget: f64,
    pub exo_armed: bool,
    pub torque_profile: Option<TorqueProfile>,
    pub torque_magnitude: f64,
}

impl Default for ControlSnapshot {
    fn default() -> Self {
        Self {
            phase: Phase::InitialScreen,
            run: 0,
            trial_index: 0,
            trial_direction: None,
            event: EventCode::NoEvent,
            trial_in_progress: false,
            remaining_time: None,
            deadline_budget: 0.0,
            exo_armed: false,
            torque_profile: None,
            torque_magnitude: 0.0,
        }
    }
}

impl ControlSnapshot {
    pub fn event_label(&self) -> &'static str {
        self.event.label()
    }
}

#[derive(Debug)]
struct ControlCells {
    phase: AtomicU8,
    run: AtomicU64,
    trial_index: AtomicUsize,
    trial_direction: AtomicU8,
    event_code: AtomicU8,
    trial_in_progress: AtomicBool,
    has_remaining: AtomicBool,
    remaining_time: AtomicF64,
    deadline_budget: AtomicF64,
    exo_armed: AtomicBool,
    torque_profile: AtomicU8,
    torque_magnitude: AtomicF64,
}

impl ControlCells {
    fn new() -> Self {
        Self {
            phase: AtomicU8::new(Phase::InitialScreen.id()),
            run: AtomicU64::new(0),
            trial_index: AtomicUsize::new(0),
            trial_direction: AtomicU8::new(NO_DIRECTION),
            event_code: AtomicU8::new(EventCode::NoEvent.code()),
            trial_in_progress: AtomicBool::new(false),
            has_remaining: AtomicBool::new(false),
            remaining_time: AtomicF64::new(0.0),
            deadline_budget: AtomicF64::new(0.0),
            exo_armed: AtomicBool::new(false),
            torque_profile: AtomicU8::new(NO_PROFILE),
            torque_magnitude: AtomicF64::new(0.0),
        }
    }
}

/// Sole writer of the controller fields
#[derive(Debug)]
pub struct ControlWriter {
    cells: Arc<ControlCells>,
}

impl ControlWriter {
    /// Publish the controller's state for this tick
    pub fn publish(&mut self, snapshot: &ControlSnapshot) {
        let cells = &self.cells;
        cells.run.store(snapshot.run, Ordering::Release);
        cells.trial_index.store(snapshot.trial_index, Ordering::Release);
        cells
            .trial_direction
            .store(direction_to_u8(snapshot.trial_direction), Ordering::Release);
        cells.trial_in_progress.store(snapshot.trial_in_progress, Ordering::Release);
        cells.has_remaining.store(snapshot.remaining_time.is_some(), Ordering::Release);
        cells.remaining_time.store(snapshot.remaining_time.unwrap_or(0.0));
        cells.deadline_budget.store(snapshot.deadline_budget);
        cells.exo_armed.store(snapshot.exo_armed, Ordering::Release);
        cells.torque_profile.store(
            snapshot.torque_profile.map(|p| p.code()).unwrap_or(NO_PROFILE),
            Ordering::Release,
        );
        cells.torque_magnitude.store(snapshot.torque_magnitude);
        // Event and phase last so readers that observe them see the matching trial fields
        cells.event_code.store(snapshot.event.code(), Ordering::Release);
        cells.phase.store(snapshot.phase.id(), Ordering::Release);
    }

    pub fn reader(&self) -> ControlReader {
        ControlReader { cells: Arc::clone(&self.cells) }
    }
}

/// Lock-free view of the controller fields
#[derive(Debug, Clone)]
pub struct ControlReader {
    cells: Arc<ControlCells>,
}

impl ControlReader {
    /// Current phase; an unknown id is a fatal state error
    pub fn phase(&self) -> ExoResult<Phase> {
        Phase::try_from(self.cells.phase.load(Ordering::Acquire))
    }

    pub fn run(&self) -> u64 {
        self.cells.run.load(Ordering::Acquire)
    }

    pub fn trial_index(&self) -> usize {
        self.cells.trial_index.load(Ordering::Acquire)
    }

    pub fn trial_direction(&self) -> Option<Direction> {
        direction_from_u8(self.cells.trial_direction.load(Ordering::Acquire))
    }

    pub fn event(&self) -> EventCode {
        EventCode::from_code(self.cells.event_code.load(Ordering::Acquire)).unwrap_or(EventCode::NoEvent)
    }

    pub fn torque_profile(&self) -> Option<TorqueProfile> {
        TorqueProfile::from_code(self.cells.torque_profile.load(Ordering::Acquire))
    }

    pub fn torque_magnitude(&self) -> f64 {
        self.cells.torque_magnitude.load()
    }

    pub fn snapshot(&self) -> ExoResult<ControlSnapshot> {
        let cells = &self.cells;
        let phase = self.phase()?;
        let event = self.event();
        Ok(ControlSnapshot {
            phase,
            run: self.run(),
            trial_index: self.trial_index(),
            trial_direction: self.trial_direction(),
            event,
            trial_in_progress: cells.trial_in_progress.load(Ordering::Acquire),
            remaining_time: cells
                .has_remaining
                .load(Ordering::Acquire)
                .then(|| cells.remaining_time.load()),
            deadline_budget: cells.deadline_budget.load(),
            exo_armed: cells.exo_armed.load(Ordering::Acquire),
            torque_profile: self.torque_profile(),
            torque_magnitude: self.torque_magnitude(),
        })
    }
}

/// Latest hardware readings
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorSnapshot {
    /// Arm angle; `None` until the first sample arrives
    pub position: Option<f64>,
    pub velocity: f64,
    pub torque: f64,
    pub executing: bool,
    pub stream_online: bool,
}

#[derive(Debug)]
struct SensorCells {
    has_position: AtomicBool,
    position: AtomicF64,
    velocity: AtomicF64,
    torque: AtomicF64,
    executing: AtomicBool,
    stream_online: AtomicBool,
}

/// Sole writer of the sensor fields
#[derive(Debug)]
pub struct SensorWriter {
    cells: Arc<SensorCells>,
}

impl SensorWriter {
    pub fn record_sample(&mut self, sample: &crate::hal::ExoSample) {
        let cells = &self.cells;
        cells.position.store(sample.position);
        cells.velocity.store(sample.velocity);
        cells.torque.store(sample.torque);
        cells.executing.store(sample.executing, Ordering::Release);
        cells.has_position.store(true, Ordering::Release);
    }

    pub fn set_stream_online(&mut self, online: bool) {
        self.cells.stream_online.store(online, Ordering::Release);
    }

    pub fn reader(&self) -> SensorReader {
        SensorReader { cells: Arc::clone(&self.cells) }
    }
}

/// Lock-free view of the sensor fields
#[derive(Debug, Clone)]
pub struct SensorReader {
    cells: Arc<SensorCells>,
}

impl SensorReader {
    pub fn snapshot(&self) -> SensorSnapshot {
        let cells = &self.cells;
        SensorSnapshot {
            position: cells
                .has_position
                .load(Ordering::Acquire)
                .then(|| cells.position.load()),
            velocity: cells.velocity.load(),
            torque: cells.torque.load(),
            executing: cells.executing.load(Ordering::Acquire),
            stream_online: cells.stream_online.load(Ordering::Acquire),
        }
    }
}

/// Sole writer of the bus timestamp
#[derive(Debug)]
pub struct TimestampPublisher {
    cell: Arc<Mutex<f64>>,
}

impl TimestampPublisher {
    pub fn publish(&mut self, timestamp: f64) {
        *self.cell.lock() = timestamp;
    }
}

/// Reader of the bus timestamp, taken once per controller tick
#[derive(Debug, Clone)]
pub struct TimestampReader {
    cell: Arc<Mutex<f64>>,
}

impl TimestampReader {
    pub fn read(&self) -> f64 {
        *self.cell.lock()
    }
}

/// A decoded classifier prediction tagged with the trial it was taken in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prediction {
    pub trial_index: usize,
    pub direction: Direction,
}

/// Prediction-consumer side of the one-slot prediction field
#[derive(Debug)]
pub struct PredictionSender {
    tx: Sender<Prediction>,
}

impl PredictionSender {
    /// Latch a prediction; returns `false` while the slot is still occupied
    pub fn offer(&mut self, prediction: Prediction) -> bool {
        match self.tx.try_send(prediction) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Controller side of the prediction field: read-and-clear
#[derive(Debug)]
pub struct PredictionReceiver {
    rx: Receiver<Prediction>,
}

impl PredictionReceiver {
    /// Take the latched prediction for `trial_index`, discarding stale ones
    pub fn take_for(&mut self, trial_index: usize) -> Option<Prediction> {
        while let Ok(prediction) = self.rx.try_recv() {
            if prediction.trial_index == trial_index {
                return Some(prediction);
            }
        }
        None
    }

    /// Empty the slot
    pub fn clear(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

/// All handles over one shared experiment record
#[derive(Debug)]
pub struct SharedState {
    pub control: ControlWriter,
    pub sensors: SensorWriter,
    pub timestamp: TimestampPublisher,
    pub timestamp_reader: TimestampReader,
    pub prediction_sender: PredictionSender,
    pub prediction_receiver: PredictionReceiver,
}

impl SharedState {
    pub fn new() -> Self {
        let timestamp = Arc::new(Mutex::new(0.0));
        let (tx, rx) = channel::bounded(1);

        Self {
            control: ControlWriter { cells: Arc::new(ControlCells::new()) },
            sensors: SensorWriter {
                cells: Arc::new(SensorCells {
                    has_position: AtomicBool::new(false),
                    position: AtomicF64::new(0.0),
                    velocity: AtomicF64::new(0.0),
                    torque: AtomicF64::new(0.0),
                    executing: AtomicBool::new(false),
                    stream_online: AtomicBool::new(true),
                }),
            },
            timestamp: TimestampPublisher { cell: Arc::clone(&timestamp) },
            timestamp_reader: TimestampReader { cell: timestamp },
            prediction_sender: PredictionSender { tx },
            prediction_receiver: PredictionReceiver { rx },
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

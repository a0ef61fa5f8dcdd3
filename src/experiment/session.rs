// src/experiment/session.rs
//! Fixed-rate session loop around the trial controller
//!
//! Each tick is strictly ordered: read the device, fold in worker health,
//! poll operator input, advance the controller (which may command the
//! device), then record and render.

use crate::config::ExperimentConfig;
use crate::error::{ExoError, ExoErrorBuilder, ExoResult};
use crate::experiment::controller::{ExperimentSummary, TickInput, TickOutcome, TrialController};
use crate::experiment::phase::{EventCode, ExitReason, Phase};
use crate::experiment::trial::Direction;
use crate::hal::{ExoDevice, Frontend, PredictionSource, TelemetryBus};
use crate::recording::Recorder;
use crate::streaming::{
    CancelSource, PredictionConsumer, SensorReader, SensorWriter, SharedState, StreamerTiming,
    SupervisedWorker, TelemetryStreamer, TimestampReader, WorkerKind, WorkerSupervisor,
};
use crate::utils::geometry::{PositionMapper, Zones};
use crate::utils::link::LinkMonitor;
use crate::utils::time::SharedClock;
use crossbeam::channel::tick;
use serde::Serialize;
use tracing::{error, info, warn};

/// Everything a frontend or recorder needs about one tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateView {
    /// Bus timestamp published by the telemetry streamer
    pub timestamp: f64,
    pub phase: Phase,
    pub exit_reason: Option<ExitReason>,
    pub trial_index: usize,
    pub total_trials: usize,
    pub trial_direction: Option<Direction>,
    pub event: EventCode,
    pub remaining_time: Option<f64>,
    pub position: Option<f64>,
    pub velocity: f64,
    pub torque: f64,
    pub screen_y: f64,
    pub zones: Zones,
    pub stream_online: bool,
    pub prediction: Option<Direction>,
    pub main_text: &'static str,
    pub sub_text: &'static str,
    /// Filled on the exit screen after the script completed
    pub summary: Option<ExperimentSummary>,
}

impl StateView {
    pub fn event_label(&self) -> &'static str {
        self.event.label()
    }
}

/// External collaborators driven by a session
pub struct Collaborators<D, F, R> {
    pub device: D,
    pub frontend: F,
    pub recorder: R,
    pub bus: Box<dyn TelemetryBus>,
    /// Required when live prediction is enabled
    pub predictions: Option<Box<dyn PredictionSource>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStep {
    Continue,
    Stop,
}

pub struct ExperimentSession<D: ExoDevice, F: Frontend, R: Recorder> {
    config: ExperimentConfig,
    clock: SharedClock,
    device: D,
    frontend: F,
    recorder: R,
    controller: TrialController,
    sensors: SensorWriter,
    sensor_reader: SensorReader,
    timestamp: TimestampReader,
    mapper: PositionMapper,
    link: LinkMonitor,
    cancel: CancelSource,
    supervisor: WorkerSupervisor,
    telemetry: Option<SupervisedWorker<TelemetryStreamer<Box<dyn TelemetryBus>>>>,
    prediction: Option<SupervisedWorker<PredictionConsumer<Box<dyn PredictionSource>>>>,
    failed_workers: Vec<WorkerKind>,
    ticks: u64,
}

impl<D: ExoDevice, F: Frontend, R: Recorder> ExperimentSession<D, F, R> {
    /// Build the controller and start the background workers
    pub fn new(
        config: ExperimentConfig,
        clock: SharedClock,
        state: SharedState,
        collaborators: Collaborators<D, F, R>,
    ) -> ExoResult<Self> {
        config.validate_consistency().map_err(|errors| {
            ExoErrorBuilder::new("session", "new").configuration(&errors.join("; "))
        })?;
        if config.experiment.live_prediction && collaborators.predictions.is_none() {
            return Err(ExoErrorBuilder::new("session", "new")
                .configuration("live prediction enabled without a prediction source"));
        }

        let SharedState {
            control,
            sensors,
            timestamp,
            timestamp_reader,
            prediction_sender,
            prediction_receiver,
        } = state;
        let Collaborators { device, frontend, recorder, bus, predictions } = collaborators;

        let control_reader = control.reader();
        let sensor_reader = sensors.reader();
        let controller = TrialController::new(config.clone(), clock.clone(), control, prediction_receiver)?;

        let cancel = CancelSource::new();
        let supervisor = WorkerSupervisor::new(cancel.token());

        let streamer = TelemetryStreamer::new(
            bus,
            control_reader.clone(),
            sensor_reader.clone(),
            timestamp,
            clock.clone(),
            StreamerTiming {
                telemetry_interval: config.telemetry_interval(),
                event_poll_interval: config.event_poll_interval(),
            },
        );
        let telemetry = Some(supervisor.spawn(streamer)?);

        let prediction = match predictions.filter(|_| config.experiment.live_prediction) {
            Some(source) => {
                let consumer = PredictionConsumer::new(
                    source,
                    control_reader,
                    prediction_sender,
                    config.prediction_poll_interval(),
                    config.prediction_timeout(),
                );
                Some(supervisor.spawn(consumer)?)
            }
            None => None,
        };

        let mapper = PositionMapper::new(config.geometry.clone());
        let link = LinkMonitor::new(config.device.offline_miss_threshold, config.offline_debounce());

        Ok(Self {
            config,
            clock,
            device,
            frontend,
            recorder,
            controller,
            sensors,
            sensor_reader,
            timestamp: timestamp_reader,
            mapper,
            link,
            cancel,
            supervisor,
            telemetry,
            prediction,
            failed_workers: Vec::new(),
            ticks: 0,
        })
    }

    /// Run at the configured tick rate until the operator leaves or the frontend stops
    pub fn run(&mut self) -> ExoResult<ExperimentSummary> {
        info!(
            tick_hz = self.config.timing.tick_rate_hz,
            trials = self.controller.script().len(),
            "Session started"
        );
        self.start_recording_run();

        let ticker = tick(self.config.tick_interval());
        let result = loop {
            if ticker.recv().is_err() {
                break Err(ExoErrorBuilder::new("session", "run").timing("tick source closed"));
            }
            match self.step() {
                Ok(SessionStep::Continue) => {}
                Ok(SessionStep::Stop) => break Ok(()),
                Err(err) => break Err(err),
            }
        };

        self.shutdown();
        result.map(|()| self.controller.summary())
    }

    /// One ordered session tick
    pub fn step(&mut self) -> ExoResult<SessionStep> {
        let now = self.clock.now();
        self.ticks += 1;

        match self.device.read_sample(self.config.read_timeout()) {
            Ok(Some(sample)) => {
                self.sensors.record_sample(&sample);
                self.link.record_sample();
            }
            Ok(None) => {
                self.link.record_miss(now);
            }
            Err(err) => {
                let err = ExoError::device(
                    self.device.device_kind(),
                    err,
                    crate::error_context!("session", "read_sample"),
                );
                warn!(error = %err, "Device read failed");
                self.link.record_miss(now);
            }
        }

        for report in self.supervisor.poll_health() {
            if report.is_failure() && !self.cancel.is_cancelled() {
                error!(worker = %report.worker, "Background worker lost, treating stream as offline");
                if !self.failed_workers.contains(&report.worker) {
                    self.failed_workers.push(report.worker);
                }
            }
        }

        let edges = self.frontend.poll_input();
        if edges.confirm && self.controller.phase() == Phase::Exit && !self.failed_workers.is_empty() {
            self.respawn_workers()?;
        }

        let stream_online = self.is_stream_online();
        self.sensors.set_stream_online(stream_online);
        let sensors = self.sensor_reader.snapshot();
        let zones = self.mapper.zones(sensors.position);

        let input = TickInput { edges, zones, stream_online };
        let outcome = self.controller.tick(&input, &mut self.device)?;
        if outcome == TickOutcome::Restarted {
            self.start_recording_run();
        }

        let view = self.view(zones, stream_online);
        if let Err(err) = self.recorder.record(&view) {
            warn!(error = %ExoError::from(err), "Recording failed");
        }
        let keep_running = self.frontend.render(&view);

        Ok(match outcome {
            TickOutcome::ExperimentOver => SessionStep::Stop,
            _ if !keep_running => {
                info!("Frontend requested stop");
                SessionStep::Stop
            }
            _ => SessionStep::Continue,
        })
    }

    fn start_recording_run(&mut self) {
        if let Err(err) = self.recorder.record_config(&self.config) {
            warn!(error = %ExoError::from(err), "Could not record configuration");
        }
    }

    fn respawn_workers(&mut self) -> ExoResult<()> {
        for kind in std::mem::take(&mut self.failed_workers) {
            match kind {
                WorkerKind::Telemetry => {
                    if let Some(worker) = self.telemetry.as_mut() {
                        worker.respawn(&self.supervisor)?;
                    }
                }
                WorkerKind::Prediction => {
                    if let Some(worker) = self.prediction.as_mut() {
                        worker.respawn(&self.supervisor)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn view(&self, zones: Zones, stream_online: bool) -> StateView {
        let sensors = self.sensor_reader.snapshot();
        let phase = self.controller.phase();
        let (main_text, sub_text) = self.controller.screen_text();
        let exit_reason = self.controller.exit_reason();

        StateView {
            timestamp: self.timestamp.read(),
            phase,
            exit_reason,
            trial_index: self.controller.trial_index(),
            total_trials: self.controller.script().len(),
            trial_direction: self.controller.current_trial().map(|trial| trial.direction),
            event: self.controller.control_reader().event(),
            remaining_time: self.controller.remaining_time().map(|r| r.as_secs_f64()),
            position: sensors.position,
            velocity: sensors.velocity,
            torque: sensors.torque,
            screen_y: self.mapper.screen_y(sensors.position),
            zones,
            stream_online,
            prediction: self.controller.last_prediction(),
            main_text,
            sub_text,
            summary: (exit_reason == Some(ExitReason::Completed)).then(|| self.controller.summary()),
        }
    }

    /// Stop the workers and flush the recording
    pub fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.telemetry.take() {
            if let Err(err) = worker.shutdown() {
                warn!(error = %err, "Telemetry worker did not stop cleanly");
            }
        }
        if let Some(worker) = self.prediction.take() {
            if let Err(err) = worker.shutdown() {
                warn!(error = %err, "Prediction worker did not stop cleanly");
            }
        }
        if let Err(err) = self.recorder.flush() {
            warn!(error = %ExoError::from(err), "Could not flush recording");
        }
        info!(ticks = self.ticks, commands = self.controller.commands_sent(), "Session stopped");
    }

    pub fn controller(&self) -> &TrialController {
        &self.controller
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    pub fn frontend_mut(&mut self) -> &mut F {
        &mut self.frontend
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    pub fn is_stream_online(&self) -> bool {
        self.link.is_online() && self.failed_workers.is_empty()
    }
}

impl<D: ExoDevice, F: Frontend, R: Recorder> Drop for ExperimentSession<D, F, R> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// src/hal/traits.rs
//! Collaborator traits: exoskeleton, telemetry bus, classifier and operator frontend

use crate::error::DeviceKind;
use crate::experiment::StateView;
use crate::hal::types::{
    BusError, EventSample, ExoSample, InputEdges, MotorCommand, PredictedLabel, TelemetrySample,
};
use std::error::Error;
use std::time::Duration;

/// Exoskeleton link used by the controller loop
pub trait ExoDevice: Send {
    type Error: Error + Send + Sync + 'static;

    /// Read the next sample, waiting at most `timeout`; `None` means no sample this tick
    fn read_sample(&mut self, timeout: Duration) -> Result<Option<ExoSample>, Self::Error>;

    /// Send a motor command
    fn send_command(&mut self, command: &MotorCommand) -> Result<(), Self::Error>;

    /// Device category for error reporting
    fn device_kind(&self) -> DeviceKind;
}

/// Outlet for continuous telemetry and discrete events
pub trait TelemetryBus: Send {
    fn push_telemetry(&mut self, sample: &TelemetrySample) -> Result<(), BusError>;

    fn push_event(&mut self, event: &EventSample) -> Result<(), BusError>;
}

impl<T: TelemetryBus + ?Sized> TelemetryBus for Box<T> {
    fn push_telemetry(&mut self, sample: &TelemetrySample) -> Result<(), BusError> {
        (**self).push_telemetry(sample)
    }

    fn push_event(&mut self, event: &EventSample) -> Result<(), BusError> {
        (**self).push_event(event)
    }
}

/// Inlet for classifier predictions
pub trait PredictionSource: Send {
    /// Wait at most `timeout` for the next prediction
    fn poll_prediction(&mut self, timeout: Duration) -> Result<Option<PredictedLabel>, BusError>;
}

impl<T: PredictionSource + ?Sized> PredictionSource for Box<T> {
    fn poll_prediction(&mut self, timeout: Duration) -> Result<Option<PredictedLabel>, BusError> {
        (**self).poll_prediction(timeout)
    }
}

/// Operator-facing renderer and input
pub trait Frontend {
    /// Edges and latch for the current tick
    fn poll_input(&mut self) -> InputEdges;

    /// Draw the current state; `false` asks the outer loop to stop
    fn render(&mut self, view: &StateView) -> bool;
}

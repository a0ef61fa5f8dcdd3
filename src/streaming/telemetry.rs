// src/streaming/telemetry.rs
//! Background worker pushing telemetry and edge-triggered trial events

use crate::error::{ExoError, ExoResult};
use crate::experiment::phase::EventCode;
use crate::hal::{EventSample, TelemetryBus, TelemetrySample};
use crate::streaming::cancel::CancelToken;
use crate::streaming::shared_state::{ControlReader, SensorReader, TimestampPublisher};
use crate::utils::time::SharedClock;
use crossbeam::channel::tick;
use crossbeam::select;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Telemetry streamer cadences
#[derive(Debug, Clone, Copy)]
pub struct StreamerTiming {
    pub telemetry_interval: Duration,
    pub event_poll_interval: Duration,
}

/// Pushes continuous samples on one ticker and discrete events on another
pub struct TelemetryStreamer<B: TelemetryBus> {
    bus: B,
    control: ControlReader,
    sensors: SensorReader,
    timestamp: TimestampPublisher,
    clock: SharedClock,
    timing: StreamerTiming,
    last_pushed_event: EventCode,
    telemetry_pushed: u64,
    events_pushed: u64,
}

impl<B: TelemetryBus> TelemetryStreamer<B> {
    pub fn new(
        bus: B,
        control: ControlReader,
        sensors: SensorReader,
        timestamp: TimestampPublisher,
        clock: SharedClock,
        timing: StreamerTiming,
    ) -> Self {
        Self {
            bus,
            control,
            sensors,
            timestamp,
            clock,
            timing,
            last_pushed_event: EventCode::NoEvent,
            telemetry_pushed: 0,
            events_pushed: 0,
        }
    }

    /// Run until cancelled or until a push fails
    pub fn run(&mut self, cancel: &CancelToken) -> ExoResult<()> {
        info!(
            telemetry_ms = self.timing.telemetry_interval.as_millis() as u64,
            event_poll_ms = self.timing.event_poll_interval.as_millis() as u64,
            "Telemetry streamer started"
        );
        let telemetry_ticker = tick(self.timing.telemetry_interval);
        let event_ticker = tick(self.timing.event_poll_interval);

        while !cancel.is_cancelled() {
            select! {
                recv(telemetry_ticker) -> _ => self.push_telemetry()?,
                recv(event_ticker) -> _ => self.push_event_if_changed()?,
                recv(cancel.receiver()) -> _ => break,
            }
        }

        info!(
            telemetry = self.telemetry_pushed,
            events = self.events_pushed,
            "Telemetry streamer stopped"
        );
        Ok(())
    }

    /// Publish the bus timestamp and push one continuous sample
    pub fn push_telemetry(&mut self) -> ExoResult<()> {
        let timestamp = self.clock.now_secs();
        self.timestamp.publish(timestamp);

        let sensors = self.sensors.snapshot();
        let sample = TelemetrySample {
            position: sensors.position.unwrap_or(f64::NAN),
            velocity: sensors.velocity,
            torque: sensors.torque,
            timestamp,
        };
        self.bus.push_telemetry(&sample).map_err(|err| {
            warn!(error = %err, "Telemetry push failed");
            ExoError::from(err)
        })?;
        self.telemetry_pushed += 1;
        Ok(())
    }

    /// Push the current event once per change of event code
    pub fn push_event_if_changed(&mut self) -> ExoResult<()> {
        let event = self.control.event();
        if event == self.last_pushed_event || !event.is_event() {
            return Ok(());
        }

        let timestamp = self.clock.now_secs();
        self.timestamp.publish(timestamp);

        let sample = EventSample {
            event_code: event.code(),
            event_label: event.label().to_string(),
            torque_profile: self.control.torque_profile(),
            torque_magnitude: self.control.torque_magnitude(),
            timestamp,
        };
        self.bus.push_event(&sample).map_err(|err| {
            warn!(error = %err, event = %event, "Event push failed");
            ExoError::from(err)
        })?;

        debug!(event = %event, timestamp, "Event pushed");
        self.last_pushed_event = event;
        self.events_pushed += 1;
        Ok(())
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

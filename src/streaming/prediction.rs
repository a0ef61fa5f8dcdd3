// src/streaming/prediction.rs
//! Background worker latching one classifier prediction per trial

use crate::error::{ExoError, ExoResult};
use crate::experiment::trial::Direction;
use crate::hal::{PredictedLabel, PredictionSource};
use crate::streaming::cancel::CancelToken;
use crate::streaming::shared_state::{ControlReader, Prediction, PredictionSender};
use crossbeam::channel::tick;
use crossbeam::select;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct PredictionPayload {
    predicted_event_name: String,
}

/// Decode a classifier label: either a JSON payload carrying
/// `predicted_event_name` or a bare `UP`/`DOWN`
pub fn parse_prediction(label: &PredictedLabel) -> Option<Direction> {
    let raw = label.label.trim();
    let name = match serde_json::from_str::<PredictionPayload>(raw) {
        Ok(payload) => payload.predicted_event_name,
        Err(_) => raw.to_string(),
    };
    name.parse().ok()
}

/// Outcome of one poll step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Outside the motion window; the source was not polled
    Idle,
    /// Polled but nothing new was latched
    Nothing,
    Latched(Prediction),
}

/// Polls the classifier inlet only while a trial is in its motion window
pub struct PredictionConsumer<P: PredictionSource> {
    source: P,
    control: ControlReader,
    sender: PredictionSender,
    poll_interval: Duration,
    poll_timeout: Duration,
    /// `(run, trial)` of the last latched prediction
    latched: Option<(u64, usize)>,
}

impl<P: PredictionSource> PredictionConsumer<P> {
    pub fn new(
        source: P,
        control: ControlReader,
        sender: PredictionSender,
        poll_interval: Duration,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            source,
            control,
            sender,
            poll_interval,
            poll_timeout,
            latched: None,
        }
    }

    /// Run until cancelled or until the inlet fails
    pub fn run(&mut self, cancel: &CancelToken) -> ExoResult<()> {
        info!(
            poll_ms = self.poll_interval.as_millis() as u64,
            "Prediction consumer started"
        );
        let ticker = tick(self.poll_interval);

        while !cancel.is_cancelled() {
            select! {
                recv(ticker) -> _ => {
                    self.poll_once()?;
                }
                recv(cancel.receiver()) -> _ => break,
            }
        }

        info!("Prediction consumer stopped");
        Ok(())
    }

    pub fn poll_once(&mut self) -> ExoResult<PollOutcome> {
        let phase = self.control.phase()?;
        if !phase.is_prediction_window() {
            self.latched = None;
            return Ok(PollOutcome::Idle);
        }

        let label = self
            .source
            .poll_prediction(self.poll_timeout)
            .map_err(ExoError::from)?;
        let Some(label) = label else {
            return Ok(PollOutcome::Nothing);
        };

        let key = (self.control.run(), self.control.trial_index());
        let trial_index = key.1;
        if self.latched == Some(key) {
            return Ok(PollOutcome::Nothing);
        }

        let Some(direction) = parse_prediction(&label) else {
            warn!(label = %label.label, "Unrecognized prediction label");
            return Ok(PollOutcome::Nothing);
        };

        let prediction = Prediction { trial_index, direction };
        if self.sender.offer(prediction) {
            self.latched = Some(key);
            debug!(trial = trial_index, predicted = %direction, phase = %phase, "Prediction latched");
            Ok(PollOutcome::Latched(prediction))
        } else {
            Ok(PollOutcome::Nothing)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BusChannel;
    use crate::experiment::phase::Phase;
    use crate::hal::BusError;
    use crate::streaming::shared_state::{ControlSnapshot, ControlWriter, PredictionReceiver, SharedState};
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedSource {
        labels: VecDeque<Result<Option<PredictedLabel>, BusError>>,
        polls: usize,
    }

    impl PredictionSource for ScriptedSource {
        fn poll_prediction(&mut self, _timeout: Duration) -> Result<Option<PredictedLabel>, BusError> {
            self.polls += 1;
            self.labels.pop_front().unwrap_or(Ok(None))
        }
    }

    fn consumer(
        labels: Vec<Result<Option<PredictedLabel>, BusError>>,
    ) -> (PredictionConsumer<ScriptedSource>, ControlWriter, PredictionReceiver) {
        let SharedState { control, prediction_sender, prediction_receiver, .. } = SharedState::new();
        let source = ScriptedSource { labels: labels.into(), polls: 0 };
        let consumer = PredictionConsumer::new(
            source,
            control.reader(),
            prediction_sender,
            Duration::from_millis(5),
            Duration::from_millis(1),
        );
        (consumer, control, prediction_receiver)
    }

    fn enter(control: &mut ControlWriter, phase: Phase, trial_index: usize) {
        enter_run(control, 0, phase, trial_index);
    }

    fn enter_run(control: &mut ControlWriter, run: u64, phase: Phase, trial_index: usize) {
        control.publish(&ControlSnapshot { phase, run, trial_index, ..ControlSnapshot::default() });
    }

    fn label(text: &str) -> Result<Option<PredictedLabel>, BusError> {
        Ok(Some(PredictedLabel::new(text)))
    }

    #[test]
    fn test_parse_prediction_payloads() {
        let json = PredictedLabel::new(r#"{"classifier_name":"svm","predicted_event_name":"DOWN"}"#);
        assert_eq!(parse_prediction(&json), Some(Direction::Down));
        assert_eq!(parse_prediction(&PredictedLabel::new("up")), Some(Direction::Up));
        assert_eq!(parse_prediction(&PredictedLabel::new("rest")), None);
    }

    #[test]
    fn test_idle_outside_motion_window() {
        let (mut consumer, mut control, _rx) = consumer(vec![label("UP")]);
        enter(&mut control, Phase::Imagination, 1);

        assert_eq!(consumer.poll_once().unwrap(), PollOutcome::Idle);
        assert_eq!(consumer.source.polls, 0);
    }

    #[test]
    fn test_first_prediction_latched_once_per_trial() {
        let (mut consumer, mut control, mut rx) = consumer(vec![label("UP"), label("DOWN"), label("DOWN")]);
        enter(&mut control, Phase::MovingUp, 3);

        let first = consumer.poll_once().unwrap();
        assert_eq!(first, PollOutcome::Latched(Prediction { trial_index: 3, direction: Direction::Up }));
        assert_eq!(rx.take_for(3).map(|p| p.direction), Some(Direction::Up));

        // Same trial: further samples are drained and ignored
        assert_eq!(consumer.poll_once().unwrap(), PollOutcome::Nothing);
        assert_eq!(rx.take_for(3), None);

        enter(&mut control, Phase::TrialDown, 4);
        assert!(matches!(consumer.poll_once().unwrap(), PollOutcome::Latched(_)));
        assert_eq!(rx.take_for(4).map(|p| p.direction), Some(Direction::Down));
    }

    #[test]
    fn test_restarted_run_latches_same_trial_number() {
        let (mut consumer, mut control, mut rx) = consumer(vec![label("UP"), label("DOWN")]);
        enter_run(&mut control, 0, Phase::MovingUp, 1);
        assert!(matches!(consumer.poll_once().unwrap(), PollOutcome::Latched(_)));

        // Restart clears the slot and the new run reaches trial 1 before the worker sees an idle phase
        rx.clear();
        enter_run(&mut control, 1, Phase::TrialUp, 1);
        assert_eq!(
            consumer.poll_once().unwrap(),
            PollOutcome::Latched(Prediction { trial_index: 1, direction: Direction::Down })
        );
        assert_eq!(rx.take_for(1).map(|p| p.direction), Some(Direction::Down));
    }

    #[test]
    fn test_latch_released_outside_prediction_window() {
        let (mut consumer, mut control, mut rx) = consumer(vec![label("UP"), label("DOWN")]);
        enter(&mut control, Phase::MovingDown, 2);
        assert!(matches!(consumer.poll_once().unwrap(), PollOutcome::Latched(_)));
        rx.clear();

        enter(&mut control, Phase::Exit, 2);
        assert_eq!(consumer.poll_once().unwrap(), PollOutcome::Idle);

        enter(&mut control, Phase::TrialDown, 2);
        assert!(matches!(consumer.poll_once().unwrap(), PollOutcome::Latched(_)));
        assert_eq!(rx.take_for(2).map(|p| p.direction), Some(Direction::Down));
    }

    #[test]
    fn test_inlet_failure_is_reported() {
        let (mut consumer, mut control, _rx) =
            consumer(vec![Err(BusError::Disconnected(BusChannel::Predictions))]);
        enter(&mut control, Phase::TrialUp, 1);

        let err = consumer.poll_once().unwrap_err();
        assert!(matches!(err, ExoError::Bus { channel: BusChannel::Predictions, .. }));
    }
}

// src/streaming/mod.rs
//! Shared experiment state and the background workers that read it

pub mod cancel;
pub mod prediction;
pub mod shared_state;
pub mod supervisor;
pub mod telemetry;

pub use cancel::{CancelSource, CancelToken};
pub use prediction::{parse_prediction, PollOutcome, PredictionConsumer};
pub use shared_state::{
    ControlReader, ControlSnapshot, ControlWriter, Prediction, PredictionReceiver, PredictionSender,
    SensorReader, SensorSnapshot, SensorWriter, SharedState, TimestampPublisher, TimestampReader,
};
pub use supervisor::{SupervisedWorker, Worker, WorkerKind, WorkerReport, WorkerSupervisor};
pub use telemetry::{StreamerTiming, TelemetryStreamer};

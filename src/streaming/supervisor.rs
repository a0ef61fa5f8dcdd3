// src/streaming/supervisor.rs
//! Named worker threads with an exit report on a health channel

use crate::config::constants::streaming::HEALTH_CHANNEL_CAPACITY;
use crate::error::{ExoError, ExoErrorBuilder, ExoResult};
use crate::hal::{PredictionSource, TelemetryBus};
use crate::streaming::cancel::CancelToken;
use crate::streaming::prediction::PredictionConsumer;
use crate::streaming::telemetry::TelemetryStreamer;
use crossbeam::channel::{self, Receiver, Sender};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    Telemetry,
    Prediction,
}

impl WorkerKind {
    pub fn name(self) -> &'static str {
        match self {
            WorkerKind::Telemetry => "telemetry",
            WorkerKind::Prediction => "prediction",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Long-running loop that can be moved onto its own thread
pub trait Worker: Send + 'static {
    fn kind(&self) -> WorkerKind;

    fn run(&mut self, cancel: &CancelToken) -> ExoResult<()>;
}

impl<B: TelemetryBus + 'static> Worker for TelemetryStreamer<B> {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Telemetry
    }

    fn run(&mut self, cancel: &CancelToken) -> ExoResult<()> {
        TelemetryStreamer::run(self, cancel)
    }
}

impl<P: PredictionSource + 'static> Worker for PredictionConsumer<P> {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Prediction
    }

    fn run(&mut self, cancel: &CancelToken) -> ExoResult<()> {
        PredictionConsumer::run(self, cancel)
    }
}

/// Sent once by every worker thread when its loop ends
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub worker: WorkerKind,
    /// `None` for a clean, cancelled exit
    pub error: Option<ExoError>,
}

impl WorkerReport {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Spawns workers and collects their exit reports
#[derive(Debug)]
pub struct WorkerSupervisor {
    cancel: CancelToken,
    health_tx: Sender<WorkerReport>,
    health_rx: Receiver<WorkerReport>,
}

impl WorkerSupervisor {
    pub fn new(cancel: CancelToken) -> Self {
        let (health_tx, health_rx) = channel::bounded(HEALTH_CHANNEL_CAPACITY);
        Self { cancel, health_tx, health_rx }
    }

    pub fn spawn<W: Worker>(&self, worker: W) -> ExoResult<SupervisedWorker<W>> {
        let kind = worker.kind();
        let cancel = self.cancel.clone();
        let health = self.health_tx.clone();

        let handle = thread::Builder::new()
            .name(format!("exo-{}", kind))
            .spawn(move || worker_main(worker, cancel, health))
            .map_err(|e| {
                ExoErrorBuilder::new("supervisor", "spawn")
                    .worker(kind.name(), &format!("failed to spawn thread: {}", e))
            })?;

        info!(worker = %kind, "Worker spawned");
        Ok(SupervisedWorker { kind, handle: Some(handle) })
    }

    /// Reports received since the last call
    pub fn poll_health(&self) -> Vec<WorkerReport> {
        self.health_rx.try_iter().collect()
    }
}

fn worker_main<W: Worker>(mut worker: W, cancel: CancelToken, health: Sender<WorkerReport>) -> W {
    let kind = worker.kind();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker.run(&cancel)))
        .unwrap_or_else(|_| {
            Err(ExoErrorBuilder::new("supervisor", "run").worker(kind.name(), "worker panicked"))
        });

    let error = match outcome {
        Ok(()) => None,
        Err(err) => {
            error!(worker = %kind, error = %err, "Worker stopped");
            Some(err)
        }
    };
    if health.try_send(WorkerReport { worker: kind, error }).is_err() {
        warn!(worker = %kind, "Health channel full, exit report dropped");
    }
    worker
}

/// A worker thread that hands its worker back when it ends
#[derive(Debug)]
pub struct SupervisedWorker<W> {
    kind: WorkerKind,
    handle: Option<JoinHandle<W>>,
}

impl<W: Worker> SupervisedWorker<W> {
    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Restart a worker whose exit was already reported; its thread is joined first
    pub fn respawn(&mut self, supervisor: &WorkerSupervisor) -> ExoResult<()> {
        let worker = self.join()?;
        let respawned = supervisor.spawn(worker)?;
        self.handle = respawned.handle;
        info!(worker = %self.kind, "Worker respawned");
        Ok(())
    }

    /// Wait for the thread to end; the caller cancels first
    pub fn shutdown(mut self) -> ExoResult<W> {
        self.join()
    }

    fn join(&mut self) -> ExoResult<W> {
        let handle = self.handle.take().ok_or_else(|| {
            ExoErrorBuilder::new("supervisor", "join").worker(self.kind.name(), "worker already joined")
        })?;
        handle.join().map_err(|_| {
            ExoErrorBuilder::new("supervisor", "join").worker(self.kind.name(), "worker thread panicked")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::cancel::CancelSource;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    struct FlakyWorker {
        runs: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Worker for FlakyWorker {
        fn kind(&self) -> WorkerKind {
            WorkerKind::Telemetry
        }

        fn run(&mut self, cancel: &CancelToken) -> ExoResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ExoErrorBuilder::new("test", "run").worker("telemetry", "outlet lost"));
            }
            while !cancel.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        }
    }

    fn wait_for_reports(supervisor: &WorkerSupervisor, count: usize) -> Vec<WorkerReport> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut reports = Vec::new();
        while reports.len() < count && Instant::now() < deadline {
            reports.extend(supervisor.poll_health());
            thread::sleep(Duration::from_millis(1));
        }
        reports
    }

    #[test]
    fn test_failed_worker_reports_and_respawns() {
        let source = CancelSource::new();
        let supervisor = WorkerSupervisor::new(source.token());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut worker = supervisor
            .spawn(FlakyWorker { runs: Arc::clone(&runs), fail: true })
            .unwrap();

        let reports = wait_for_reports(&supervisor, 1);
        assert_eq!(reports.len(), 1);
        assert!(reports[0].is_failure());
        assert_eq!(reports[0].worker, WorkerKind::Telemetry);

        worker.respawn(&supervisor).unwrap();
        wait_for_reports(&supervisor, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cancelled_worker_exits_cleanly() {
        let mut source = CancelSource::new();
        let supervisor = WorkerSupervisor::new(source.token());
        let runs = Arc::new(AtomicUsize::new(0));

        let worker = supervisor
            .spawn(FlakyWorker { runs, fail: false })
            .unwrap();
        assert_eq!(worker.kind(), WorkerKind::Telemetry);

        source.cancel();
        let joined = worker.shutdown().unwrap();
        assert!(!joined.fail);

        let reports = supervisor.poll_health();
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].is_failure());
    }
}

// src/recording/mod.rs
//! Per-participant session recording
//!
//! Each run gets an indexed pair of files inside
//! `<results_dir>/participant_NNN/`: `experiment_configNN.json` holding the
//! configuration and `experiment_data_NN.tsv` with one row per tick. The
//! index counts runs already present so restarts never overwrite data.

use crate::config::ExperimentConfig;
use crate::experiment::StateView;
use serde::Serialize;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

const DATA_PREFIX: &str = "experiment_data";
const CONFIG_PREFIX: &str = "experiment_config";

pub const TSV_HEADER: [&str; 11] = [
    "timestamp",
    "phase",
    "trial",
    "direction",
    "event_code",
    "event_label",
    "position",
    "velocity",
    "torque",
    "prediction",
    "remaining_time",
];

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("TSV error on {}: {source}", path.display())]
    Tsv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl RecorderError {
    fn io(path: &Path, source: io::Error) -> Self {
        RecorderError::Io { path: path.to_path_buf(), source }
    }

    fn tsv(path: &Path, source: csv::Error) -> Self {
        RecorderError::Tsv { path: path.to_path_buf(), source }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            RecorderError::Io { path, .. } | RecorderError::Tsv { path, .. } => Some(path),
            RecorderError::Serialize(_) => None,
        }
    }
}

/// Sink for session state
pub trait Recorder {
    /// Start a new run and store the configuration it uses
    fn record_config(&mut self, config: &ExperimentConfig) -> Result<(), RecorderError>;

    /// Append one tick
    fn record(&mut self, view: &StateView) -> Result<(), RecorderError>;

    fn flush(&mut self) -> Result<(), RecorderError> {
        Ok(())
    }
}

/// Recorder used when saving is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRecorder;

impl Recorder for NullRecorder {
    fn record_config(&mut self, _config: &ExperimentConfig) -> Result<(), RecorderError> {
        Ok(())
    }

    fn record(&mut self, _view: &StateView) -> Result<(), RecorderError> {
        Ok(())
    }
}

struct DataFile {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: u64,
}

/// Tab-separated recorder
pub struct TsvRecorder {
    folder: PathBuf,
    current: Option<DataFile>,
}

impl TsvRecorder {
    /// Create the participant folder under `results_dir`
    pub fn new(results_dir: &Path, participant_id: u32) -> Result<Self, RecorderError> {
        let folder = results_dir.join(format!("participant_{:03}", participant_id));
        fs::create_dir_all(&folder).map_err(|e| RecorderError::io(&folder, e))?;
        Ok(Self { folder, current: None })
    }

    /// Recorder matching the configuration's recording section
    pub fn from_config(config: &ExperimentConfig) -> Result<Self, RecorderError> {
        Self::new(&config.recording.results_dir, config.recording.participant_id)
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Data file of the current run
    pub fn data_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|file| file.path.as_path())
    }

    pub fn rows_written(&self) -> u64 {
        self.current.as_ref().map_or(0, |file| file.rows)
    }

    fn next_index(&self, prefix: &str) -> Result<usize, RecorderError> {
        let entries = fs::read_dir(&self.folder).map_err(|e| RecorderError::io(&self.folder, e))?;
        let mut count = 0;
        for entry in entries {
            let entry = entry.map_err(|e| RecorderError::io(&self.folder, e))?;
            if entry.file_name().to_string_lossy().starts_with(prefix) {
                count += 1;
            }
        }
        Ok(count)
    }

    fn open_data_file(&mut self) -> Result<(), RecorderError> {
        self.close_current()?;

        let index = self.next_index(DATA_PREFIX)?;
        let path = self.folder.join(format!("{}_{:02}.tsv", DATA_PREFIX, index));
        let file = File::create(&path).map_err(|e| RecorderError::io(&path, e))?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(file);
        writer.write_record(TSV_HEADER).map_err(|e| RecorderError::tsv(&path, e))?;

        info!(path = %path.display(), "Recording session data");
        self.current = Some(DataFile { path, writer, rows: 0 });
        Ok(())
    }

    fn close_current(&mut self) -> Result<(), RecorderError> {
        if let Some(mut file) = self.current.take() {
            file.writer.flush().map_err(|e| RecorderError::io(&file.path, e))?;
            debug!(path = %file.path.display(), rows = file.rows, "Closed data file");
        }
        Ok(())
    }
}

/// One data row, in `TSV_HEADER` order; `None` cells are written empty
#[derive(Debug, Serialize)]
struct TsvRow {
    timestamp: String,
    phase: &'static str,
    trial: usize,
    direction: Option<&'static str>,
    event_code: u8,
    event_label: &'static str,
    position: Option<String>,
    velocity: String,
    torque: String,
    prediction: Option<&'static str>,
    remaining_time: Option<String>,
}

impl From<&StateView> for TsvRow {
    fn from(view: &StateView) -> Self {
        Self {
            timestamp: format!("{:.6}", view.timestamp),
            phase: view.phase.name(),
            trial: view.trial_index,
            direction: view.trial_direction.map(|d| d.label()),
            event_code: view.event.code(),
            event_label: view.event_label(),
            position: view.position.map(|p| format!("{:.4}", p)),
            velocity: format!("{:.4}", view.velocity),
            torque: format!("{:.4}", view.torque),
            prediction: view.prediction.map(|d| d.label()),
            remaining_time: view.remaining_time.map(|r| format!("{:.3}", r)),
        }
    }
}

impl Recorder for TsvRecorder {
    fn record_config(&mut self, config: &ExperimentConfig) -> Result<(), RecorderError> {
        let index = self.next_index(CONFIG_PREFIX)?;
        let path = self.folder.join(format!("{}{:02}.json", CONFIG_PREFIX, index));
        let json = serde_json::to_string_pretty(config)?;
        fs::write(&path, json).map_err(|e| RecorderError::io(&path, e))?;
        debug!(path = %path.display(), "Stored run configuration");

        self.open_data_file()
    }

    fn record(&mut self, view: &StateView) -> Result<(), RecorderError> {
        if self.current.is_none() {
            self.open_data_file()?;
        }
        if let Some(file) = self.current.as_mut() {
            file.writer
                .serialize(TsvRow::from(view))
                .map_err(|e| RecorderError::tsv(&file.path, e))?;
            file.rows += 1;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), RecorderError> {
        match self.current.as_mut() {
            Some(file) => file.writer.flush().map_err(|e| RecorderError::io(&file.path, e)),
            None => Ok(()),
        }
    }
}

impl Drop for TsvRecorder {
    fn drop(&mut self) {
        let _ = self.close_current();
    }
}

/// Recorder picked from `recording.save_data`
pub enum SessionRecorder {
    Tsv(TsvRecorder),
    Null(NullRecorder),
}

impl SessionRecorder {
    pub fn from_config(config: &ExperimentConfig) -> Result<Self, RecorderError> {
        if config.recording.save_data {
            Ok(SessionRecorder::Tsv(TsvRecorder::from_config(config)?))
        } else {
            info!("Data saving disabled");
            Ok(SessionRecorder::Null(NullRecorder))
        }
    }
}

impl Recorder for SessionRecorder {
    fn record_config(&mut self, config: &ExperimentConfig) -> Result<(), RecorderError> {
        match self {
            SessionRecorder::Tsv(r) => r.record_config(config),
            SessionRecorder::Null(r) => r.record_config(config),
        }
    }

    fn record(&mut self, view: &StateView) -> Result<(), RecorderError> {
        match self {
            SessionRecorder::Tsv(r) => r.record(view),
            SessionRecorder::Null(r) => r.record(view),
        }
    }

    fn flush(&mut self) -> Result<(), RecorderError> {
        match self {
            SessionRecorder::Tsv(r) => r.flush(),
            SessionRecorder::Null(r) => r.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::phase::{EventCode, Phase};
    use crate::experiment::trial::Direction;
    use crate::utils::geometry::Zones;

    fn view() -> StateView {
        StateView {
            timestamp: 12.5,
            phase: Phase::MovingUp,
            exit_reason: None,
            trial_index: 2,
            total_trials: 4,
            trial_direction: Some(Direction::Up),
            event: EventCode::execute(Direction::Up),
            remaining_time: Some(3.25),
            position: None,
            velocity: 0.5,
            torque: 1.0,
            screen_y: 0.0,
            zones: Zones::default(),
            stream_online: true,
            prediction: Some(Direction::Up),
            main_text: "",
            sub_text: "",
            summary: None,
        }
    }

    #[test]
    fn test_runs_are_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExperimentConfig::default();
        let mut recorder = TsvRecorder::new(dir.path(), 7).unwrap();
        assert!(recorder.folder().ends_with("participant_007"));

        recorder.record_config(&config).unwrap();
        recorder.record(&view()).unwrap();
        assert_eq!(recorder.rows_written(), 1);

        recorder.record_config(&config).unwrap();
        recorder.flush().unwrap();

        let folder = recorder.folder().to_path_buf();
        assert!(folder.join("experiment_config00.json").exists());
        assert!(folder.join("experiment_config01.json").exists());
        assert!(folder.join("experiment_data_00.tsv").exists());
        assert!(folder.join("experiment_data_01.tsv").exists());

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(folder.join("experiment_data_00.tsv"))
            .unwrap();
        assert_eq!(reader.headers().unwrap(), &csv::StringRecord::from(TSV_HEADER.to_vec()));

        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.len(), TSV_HEADER.len());
        assert_eq!(&row[0], "12.500000");
        assert_eq!(&row[1], "MOVING_UP");
        assert_eq!(&row[2], "2");
        assert_eq!(&row[3], "UP");
        assert_eq!(&row[6], "");
        assert_eq!(&row[9], "UP");
        assert_eq!(&row[10], "3.250");
    }

    #[test]
    fn test_empty_cells_keep_columns_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = TsvRecorder::new(dir.path(), 2).unwrap();
        let idle = StateView {
            phase: Phase::InitialScreen,
            trial_index: 0,
            trial_direction: None,
            event: EventCode::NoEvent,
            remaining_time: None,
            prediction: None,
            ..view()
        };
        recorder.record(&idle).unwrap();
        recorder.record(&view()).unwrap();
        recorder.flush().unwrap();

        let path = recorder.data_path().unwrap().to_path_buf();
        let mut reader = csv::ReaderBuilder::new().delimiter(b'\t').from_path(path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.len() == TSV_HEADER.len()));
        assert_eq!(&rows[0][3], "");
        assert_eq!(&rows[0][5], "");
        assert_eq!(&rows[0][10], "");
        assert_eq!(&rows[1][1], "MOVING_UP");
    }

    #[test]
    fn test_config_is_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ExperimentConfig::default();
        config.experiment.seed = Some(99);
        let mut recorder = TsvRecorder::new(dir.path(), 1).unwrap();
        recorder.record_config(&config).unwrap();

        let text = fs::read_to_string(recorder.folder().join("experiment_config00.json")).unwrap();
        let parsed: ExperimentConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_error_carries_path() {
        let err = RecorderError::io(Path::new("/nowhere/x.tsv"), io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.path(), Some(Path::new("/nowhere/x.tsv")));
        assert!(err.to_string().contains("/nowhere/x.tsv"));
    }
}

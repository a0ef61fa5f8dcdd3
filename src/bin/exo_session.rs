//! `exo-session` binary: runs an experiment against the simulated exoskeleton
//!
//! The console frontend reads one command per line on stdin:
//!
//! ```text
//! enter | c     confirm
//! esc   | q     cancel / leave the exit screen
//! space | p     toggle pause
//! up, down, center   move the simulated arm toward a target
//! ```

use clap::Parser;
use crossbeam::channel::{unbounded, Receiver, TryRecvError};
use exo_trials::config::{ConfigLoader, ExperimentConfig};
use exo_trials::error::IntoExoError;
use exo_trials::experiment::{Collaborators, Direction, ExperimentSession, Phase, StateView};
use exo_trials::hal::simulator::{MemoryBus, SimulatedExo, SimulatedExoHandle, SimulatorConfig, SyntheticDecoder};
use exo_trials::hal::{Frontend, InputEdges, PredictionSource};
use exo_trials::recording::SessionRecorder;
use exo_trials::streaming::SharedState;
use exo_trials::utils::{KeyEdges, KeyLevels, MonotonicClock, PositionMapper};
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the session binary
#[derive(Parser, Debug)]
#[command(
    name = "exo-session",
    version,
    about = "Exoskeleton motor-imagery trial session",
    long_about = None
)]
struct Args {
    /// TOML configuration files, merged in order over the defaults
    #[arg(short, long, value_name = "FILE")]
    config: Vec<PathBuf>,

    /// Override the participant id
    #[arg(short, long)]
    participant: Option<u32>,

    /// Seed for the trial script and dwell sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Enable live prediction with a synthetic decoder of this accuracy
    #[arg(long, value_name = "0..1")]
    synthetic_accuracy: Option<f64>,

    /// Do not write any recording
    #[arg(long, default_value_t = false)]
    no_save: bool,

    /// Write the effective configuration to this file and exit
    #[arg(long, value_name = "FILE")]
    export_config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleCommand {
    Confirm,
    Cancel,
    Pause,
    Move(Option<Direction>),
}

fn parse_command(line: &str) -> Option<ConsoleCommand> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "enter" | "c" => Some(ConsoleCommand::Confirm),
        "esc" | "q" => Some(ConsoleCommand::Cancel),
        "space" | "p" => Some(ConsoleCommand::Pause),
        "up" | "u" => Some(ConsoleCommand::Move(Some(Direction::Up))),
        "down" | "d" => Some(ConsoleCommand::Move(Some(Direction::Down))),
        "center" | "m" => Some(ConsoleCommand::Move(None)),
        _ => None,
    }
}

/// Line-based operator console
struct ConsoleFrontend {
    commands: Receiver<ConsoleCommand>,
    keys: KeyEdges,
    arm: SimulatedExoHandle,
    mapper: PositionMapper,
    last_phase: Option<Phase>,
    stdin_closed: bool,
}

impl ConsoleFrontend {
    fn spawn(arm: SimulatedExoHandle, mapper: PositionMapper) -> std::io::Result<Self> {
        let (tx, rx) = unbounded();
        thread::Builder::new()
            .name("exo-console".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    match parse_command(&line) {
                        Some(command) => {
                            if tx.send(command).is_err() {
                                break;
                            }
                        }
                        None => warn!(input = %line.trim(), "Unknown console command"),
                    }
                }
            })?;

        Ok(Self {
            commands: rx,
            keys: KeyEdges::new(),
            arm,
            mapper,
            last_phase: None,
            stdin_closed: false,
        })
    }
}

impl Frontend for ConsoleFrontend {
    fn poll_input(&mut self) -> InputEdges {
        let mut levels = KeyLevels::default();
        loop {
            match self.commands.try_recv() {
                Ok(ConsoleCommand::Confirm) => levels.confirm = true,
                Ok(ConsoleCommand::Cancel) => levels.cancel = true,
                Ok(ConsoleCommand::Pause) => levels.pause = true,
                Ok(ConsoleCommand::Move(direction)) => {
                    self.arm.set_target_deg(self.mapper.target_angle(direction));
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.stdin_closed = true;
                    break;
                }
            }
        }
        self.keys.update(levels)
    }

    fn render(&mut self, view: &StateView) -> bool {
        if self.last_phase != Some(view.phase) {
            self.last_phase = Some(view.phase);
            info!(
                phase = view.phase.name(),
                trial = view.trial_index,
                of = view.total_trials,
                direction = view.trial_direction.map(|d| d.label()).unwrap_or("-"),
                "{} {}",
                view.main_text,
                view.sub_text
            );
            if let Some(summary) = &view.summary {
                info!(
                    successes = summary.success_count,
                    total = summary.total_trials,
                    avg_time_s = summary.avg_time.unwrap_or(f64::NAN),
                    "Experiment summary"
                );
            }
        }
        if self.stdin_closed && view.phase == Phase::Exit {
            info!("Console closed");
            return false;
        }
        true
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn load_config(args: &Args) -> Result<ExperimentConfig, Box<dyn std::error::Error>> {
    let mut loader = if args.config.is_empty() {
        ConfigLoader::new()
    } else {
        ConfigLoader::with_paths(args.config.clone())
    };
    let mut config = loader.load()?;

    if let Some(participant) = args.participant {
        config.recording.participant_id = participant;
    }
    if args.seed.is_some() {
        config.experiment.seed = args.seed;
    }
    if args.no_save {
        config.recording.save_data = false;
    }
    if args.synthetic_accuracy.is_some() {
        config.experiment.live_prediction = true;
    }
    Ok(config)
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&args)?;
    if let Some(path) = &args.export_config {
        std::fs::write(path, toml::to_string_pretty(&config)?).exo_err("config", "export")?;
        info!(path = %path.display(), "Configuration exported");
        return Ok(());
    }

    info!("{} v{}", exo_trials::NAME, exo_trials::VERSION);
    let clock = MonotonicClock::shared();
    let state = SharedState::new();

    let device = SimulatedExo::new(
        SimulatorConfig {
            min_position_deg: config.geometry.min_position_deg,
            max_position_deg: config.geometry.max_position_deg,
            ..SimulatorConfig::default()
        },
        clock.clone(),
    )?;
    let mapper = PositionMapper::new(config.geometry.clone());
    let frontend = ConsoleFrontend::spawn(device.handle(), mapper).exo_err("console", "spawn_reader")?;
    let recorder = SessionRecorder::from_config(&config)?;

    let predictions: Option<Box<dyn PredictionSource>> = if config.experiment.live_prediction {
        let accuracy = args.synthetic_accuracy.unwrap_or(1.0);
        info!(accuracy, "Using synthetic decoder");
        Some(Box::new(SyntheticDecoder::new(
            state.control.reader(),
            accuracy,
            config.experiment.seed,
        )))
    } else {
        None
    };

    let collaborators = Collaborators {
        device,
        frontend,
        recorder,
        bus: Box::new(MemoryBus::new()),
        predictions,
    };
    let mut session = ExperimentSession::new(config, clock, state, collaborators)?;
    let summary = session.run()?;

    info!(
        successes = summary.success_count,
        total = summary.total_trials,
        "Session finished"
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

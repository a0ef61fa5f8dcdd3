use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use exo_trials::config::{ConditionConfig, ExperimentConfig};
use exo_trials::error::DeviceKind;
use exo_trials::experiment::{generate, TickInput, TrialController};
use exo_trials::hal::{ExoDevice, ExoSample, InputEdges, MotorCommand};
use exo_trials::streaming::SharedState;
use exo_trials::utils::{ManualClock, PositionMapper, Zones};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

const TRIAL_COUNTS: &[usize] = &[10, 100, 1000];

struct NullExo;

impl ExoDevice for NullExo {
    type Error = std::io::Error;

    fn read_sample(&mut self, _timeout: Duration) -> Result<Option<ExoSample>, Self::Error> {
        Ok(None)
    }

    fn send_command(&mut self, _command: &MotorCommand) -> Result<(), Self::Error> {
        Ok(())
    }

    fn device_kind(&self) -> DeviceKind {
        DeviceKind::Simulated
    }
}

fn config_with_trials(trials: usize) -> ExperimentConfig {
    let mut config = ExperimentConfig::default();
    config.experiment.randomize_main_block = true;
    config.conditions = vec![
        ConditionConfig {
            assist_mode: "assist".to_string(),
            trials: trials / 2,
            profile: "random".to_string(),
            magnitude: 1.0,
        },
        ConditionConfig {
            assist_mode: "oppose".to_string(),
            trials: trials - trials / 2,
            profile: "random".to_string(),
            magnitude: 1.0,
        },
    ];
    config
}

fn benchmark_script_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("script_generation");

    for &trials in TRIAL_COUNTS {
        group.throughput(Throughput::Elements(trials as u64));
        group.bench_with_input(BenchmarkId::new("generate", trials), &trials, |b, &trials| {
            let config = config_with_trials(trials);
            let mut rng = StdRng::seed_from_u64(1);
            b.iter(|| generate(black_box(&config), &mut rng));
        });
    }

    group.finish();
}

fn benchmark_controller_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("controller");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("tick_1000", |b| {
        let clock = ManualClock::shared();
        let state = SharedState::new();
        let mut controller = TrialController::new(
            config_with_trials(100),
            clock.clone(),
            state.control,
            state.prediction_receiver,
        )
        .unwrap();
        let mut exo = NullExo;
        let inputs = [
            TickInput {
                edges: InputEdges { confirm: true, ..InputEdges::default() },
                zones: Zones { in_middle: true, ..Zones::default() },
                stream_online: true,
            },
            TickInput { stream_online: true, ..TickInput::default() },
            TickInput {
                zones: Zones { in_upper_band: true, ..Zones::default() },
                stream_online: true,
                ..TickInput::default()
            },
        ];

        b.iter(|| {
            for i in 0..1000 {
                clock.advance_by(Duration::from_millis(10));
                let _ = controller.tick(black_box(&inputs[i % inputs.len()]), &mut exo);
            }
        });
    });

    group.finish();
}

fn benchmark_position_mapping(c: &mut Criterion) {
    let mapper = PositionMapper::new(ExperimentConfig::default().geometry);

    c.bench_function("zones_sweep", |b| {
        b.iter(|| {
            let mut hits = 0usize;
            for deg in 55..=180 {
                if mapper.zones(black_box(Some(f64::from(deg)))).in_middle {
                    hits += 1;
                }
            }
            hits
        });
    });
}

criterion_group!(
    benches,
    benchmark_script_generation,
    benchmark_controller_tick,
    benchmark_position_mapping
);
criterion_main!(benches);

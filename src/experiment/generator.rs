// src/experiment/generator.rs
//! Balanced trial-sequence generation
//!
//! [`generate`] is pure apart from the random source: given a seeded rng it
//! always returns the same script. Every region is split with
//! [`balanced_directions`], so UP and DOWN counts never differ by more than
//! one and any surplus goes to UP.

use crate::config::{constants::script, ConditionConfig, ExperimentConfig};
use crate::error::{ExoError, ExoErrorBuilder, ExoResult};
use crate::experiment::trial::{
    AssistMode, Block, Direction, ExperimentScript, TorqueProfile, TrialSpec,
};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

/// Profile selection for a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileChoice {
    Fixed(TorqueProfile),
    /// Uniform draw per trial
    Random,
}

impl ProfileChoice {
    pub fn parse(name: &str) -> Result<Self, crate::experiment::trial::UnknownVariant> {
        if name == script::RANDOM_PROFILE {
            Ok(ProfileChoice::Random)
        } else {
            name.parse().map(ProfileChoice::Fixed)
        }
    }

    fn pick<R: Rng + ?Sized>(self, rng: &mut R) -> TorqueProfile {
        match self {
            ProfileChoice::Fixed(profile) => profile,
            ProfileChoice::Random => TorqueProfile::ALL[rng.gen_range(0..TorqueProfile::ALL.len())],
        }
    }
}

/// `⌈n/2⌉` UP followed by `⌊n/2⌋` DOWN
pub fn balanced_directions(n: usize) -> Vec<Direction> {
    let down = n / 2;
    let up = n - down;
    let mut directions = vec![Direction::Up; up];
    directions.extend(std::iter::repeat(Direction::Down).take(down));
    directions
}

/// Build the full experiment script
pub fn generate<R: Rng + ?Sized>(config: &ExperimentConfig, rng: &mut R) -> ExoResult<ExperimentScript> {
    let limit = config.device.torque_limit;
    if !(limit.is_finite() && limit > 0.0) {
        return Err(config_error(&format!("device torque limit must be positive, got {}", limit)));
    }

    let familiarization =
        unassisted_block(config.experiment.familiarization_trials, Block::Familiarization, rng);

    let mut main = Vec::with_capacity(config.conditions.iter().map(|c| c.trials).sum());
    for (index, condition) in config.conditions.iter().enumerate() {
        main.extend(condition_block(index, condition, limit, rng)?);
    }
    if config.experiment.randomize_main_block {
        main.shuffle(rng);
    }

    let end_control = unassisted_block(config.experiment.end_control_trials, Block::EndControl, rng);

    let script = ExperimentScript::new(familiarization, main, end_control);
    debug!(
        total = script.len(),
        familiarization = script.familiarization().len(),
        main = script.main().len(),
        end_control = script.end_control().len(),
        "Generated experiment script"
    );
    Ok(script)
}

fn unassisted_block<R: Rng + ?Sized>(n: usize, block: Block, rng: &mut R) -> Vec<TrialSpec> {
    let mut trials: Vec<TrialSpec> = balanced_directions(n)
        .into_iter()
        .map(|direction| TrialSpec::unassisted(direction, block))
        .collect();
    trials.shuffle(rng);
    trials
}

fn condition_block<R: Rng + ?Sized>(
    index: usize,
    condition: &ConditionConfig,
    limit: f64,
    rng: &mut R,
) -> ExoResult<Vec<TrialSpec>> {
    let assist_mode: AssistMode = condition
        .assist_mode
        .parse()
        .map_err(|e| config_error(&format!("condition {}: {}", index, e)))?;
    let profile = ProfileChoice::parse(&condition.profile)
        .map_err(|e| config_error(&format!("condition {}: {}", index, e)))?;

    let magnitude = condition.magnitude;
    if !magnitude.is_finite() || magnitude < 0.0 {
        return Err(config_error(&format!(
            "condition {}: torque magnitude must be a non-negative number, got {}",
            index, magnitude
        )));
    }
    let magnitude = if magnitude > limit {
        warn!(
            condition = index,
            requested = magnitude,
            limit,
            "Torque magnitude exceeds device limit, clamping"
        );
        limit
    } else {
        magnitude
    };

    let assist_correct = assist_mode == AssistMode::Assist;
    let mut trials: Vec<TrialSpec> = balanced_directions(condition.trials)
        .into_iter()
        .map(|direction| TrialSpec {
            direction,
            assist_correct,
            torque_profile: Some(profile.pick(rng)),
            torque_magnitude: magnitude,
            block: Block::Main,
        })
        .collect();
    trials.shuffle(rng);
    Ok(trials)
}

fn config_error(reason: &str) -> ExoError {
    ExoErrorBuilder::new("generator", "generate").configuration(reason)
}

// src/config/mod.rs
//! Experiment configuration management

pub mod constants;
pub mod loader;

pub use constants::*;
pub use loader::{ConfigError, ConfigLoader};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete experiment configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub experiment: ExperimentSettings,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub geometry: GeometryConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    /// Main block conditions, in presentation order
    #[serde(default = "defaults::conditions")]
    pub conditions: Vec<ConditionConfig>,
}

/// Script-level settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExperimentSettings {
    #[serde(default = "defaults::familiarization_trials")]
    pub familiarization_trials: usize,

    #[serde(default = "defaults::end_control_trials")]
    pub end_control_trials: usize,

    /// Shuffle the whole main block across conditions
    #[serde(default)]
    pub randomize_main_block: bool,

    /// Generate a fresh script when the operator restarts from the exit screen
    #[serde(default = "defaults::regenerate_on_restart")]
    pub regenerate_on_restart: bool,

    /// Derive command correctness from classifier predictions
    #[serde(default)]
    pub live_prediction: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// One main-block condition
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConditionConfig {
    /// `assist` or `oppose`
    pub assist_mode: String,

    #[serde(default = "defaults::condition_trials")]
    pub trials: usize,

    /// A torque profile name or `random`
    #[serde(default = "defaults::condition_profile")]
    pub profile: String,

    #[serde(default = "defaults::condition_magnitude")]
    pub magnitude: f64,
}

/// Dwell ranges and deadlines, in seconds
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TimingConfig {
    #[serde(default = "defaults::start_range_s")]
    pub start_range_s: [f64; 2],

    #[serde(default = "defaults::wait_range_s")]
    pub wait_range_s: [f64; 2],

    #[serde(default = "defaults::imagination_range_s")]
    pub imagination_range_s: [f64; 2],

    #[serde(default = "defaults::intention_range_s")]
    pub intention_range_s: [f64; 2],

    #[serde(default = "defaults::trial_timeout_s")]
    pub trial_timeout_s: f64,

    #[serde(default = "defaults::success_hold_s")]
    pub success_hold_s: f64,

    #[serde(default = "defaults::failure_cooldown_s")]
    pub failure_cooldown_s: f64,

    #[serde(default = "defaults::tick_rate_hz")]
    pub tick_rate_hz: u32,
}

/// Exoskeleton link settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DeviceConfig {
    #[serde(default = "defaults::torque_limit")]
    pub torque_limit: f64,

    #[serde(default = "defaults::read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "defaults::offline_miss_threshold")]
    pub offline_miss_threshold: u32,

    #[serde(default = "defaults::offline_debounce_ms")]
    pub offline_debounce_ms: u64,
}

/// Background worker cadences
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StreamingConfig {
    #[serde(default = "defaults::telemetry_interval_ms")]
    pub telemetry_interval_ms: u64,

    #[serde(default = "defaults::event_poll_interval_ms")]
    pub event_poll_interval_ms: u64,

    #[serde(default = "defaults::prediction_poll_interval_ms")]
    pub prediction_poll_interval_ms: u64,

    #[serde(default = "defaults::prediction_timeout_ms")]
    pub prediction_timeout_ms: u64,
}

/// Screen mapping of the arm angle
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GeometryConfig {
    #[serde(default = "defaults::screen_height_px")]
    pub screen_height_px: f64,

    #[serde(default = "defaults::band_offset_px")]
    pub band_offset_px: f64,

    #[serde(default = "defaults::band_width_px")]
    pub band_width_px: f64,

    #[serde(default = "defaults::center_tolerance_px")]
    pub center_tolerance_px: f64,

    #[serde(default = "defaults::min_position_deg")]
    pub min_position_deg: f64,

    #[serde(default = "defaults::max_position_deg")]
    pub max_position_deg: f64,
}

/// Persistence settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RecordingConfig {
    #[serde(default = "defaults::save_data")]
    pub save_data: bool,

    #[serde(default = "defaults::results_dir")]
    pub results_dir: PathBuf,

    #[serde(default)]
    pub participant_id: u32,
}

/// Default value providers using constants
mod defaults {
    use super::ConditionConfig;
    use crate::config::constants::*;
    use std::path::PathBuf;

    pub fn familiarization_trials() -> usize { script::DEFAULT_FAMILIARIZATION_TRIALS }
    pub fn end_control_trials() -> usize { script::DEFAULT_END_CONTROL_TRIALS }
    pub fn regenerate_on_restart() -> bool { true }

    pub fn condition_trials() -> usize { script::DEFAULT_CONDITION_TRIALS }
    pub fn condition_profile() -> String { script::RANDOM_PROFILE.to_string() }
    pub fn condition_magnitude() -> f64 { script::DEFAULT_CONDITION_MAGNITUDE }
    pub fn conditions() -> Vec<ConditionConfig> {
        vec![
            ConditionConfig {
                assist_mode: script::ASSIST_MODE_ASSIST.to_string(),
                trials: condition_trials(),
                profile: condition_profile(),
                magnitude: condition_magnitude(),
            },
            ConditionConfig {
                assist_mode: script::ASSIST_MODE_OPPOSE.to_string(),
                trials: condition_trials(),
                profile: condition_profile(),
                magnitude: condition_magnitude(),
            },
        ]
    }

    pub fn start_range_s() -> [f64; 2] { timing::DEFAULT_START_RANGE_S }
    pub fn wait_range_s() -> [f64; 2] { timing::DEFAULT_WAIT_RANGE_S }
    pub fn imagination_range_s() -> [f64; 2] { timing::DEFAULT_IMAGINATION_RANGE_S }
    pub fn intention_range_s() -> [f64; 2] { timing::DEFAULT_INTENTION_RANGE_S }
    pub fn trial_timeout_s() -> f64 { timing::DEFAULT_TRIAL_TIMEOUT_S }
    pub fn success_hold_s() -> f64 { timing::SUCCESS_HOLD_S }
    pub fn failure_cooldown_s() -> f64 { timing::FAILURE_COOLDOWN_S }
    pub fn tick_rate_hz() -> u32 { timing::DEFAULT_CONTROLLER_TICK_HZ }

    pub fn torque_limit() -> f64 { device::DEFAULT_TORQUE_LIMIT }
    pub fn read_timeout_ms() -> u64 { device::DEFAULT_READ_TIMEOUT_MS }
    pub fn offline_miss_threshold() -> u32 { device::DEFAULT_OFFLINE_MISS_THRESHOLD }
    pub fn offline_debounce_ms() -> u64 { device::DEFAULT_OFFLINE_DEBOUNCE_MS }

    pub fn telemetry_interval_ms() -> u64 { streaming::DEFAULT_TELEMETRY_INTERVAL_MS }
    pub fn event_poll_interval_ms() -> u64 { streaming::DEFAULT_EVENT_POLL_INTERVAL_MS }
    pub fn prediction_poll_interval_ms() -> u64 { streaming::DEFAULT_PREDICTION_POLL_INTERVAL_MS }
    pub fn prediction_timeout_ms() -> u64 { streaming::DEFAULT_PREDICTION_TIMEOUT_MS }

    pub fn screen_height_px() -> f64 { geometry::DEFAULT_SCREEN_HEIGHT_PX }
    pub fn band_offset_px() -> f64 { geometry::DEFAULT_BAND_OFFSET_PX }
    pub fn band_width_px() -> f64 { geometry::DEFAULT_BAND_WIDTH_PX }
    pub fn center_tolerance_px() -> f64 { geometry::DEFAULT_CENTER_TOLERANCE_PX }
    pub fn min_position_deg() -> f64 { geometry::DEFAULT_MIN_POSITION_DEG }
    pub fn max_position_deg() -> f64 { geometry::DEFAULT_MAX_POSITION_DEG }

    pub fn save_data() -> bool { true }
    pub fn results_dir() -> PathBuf { PathBuf::from(paths::DEFAULT_RESULTS_DIR) }
}

impl Default for ExperimentSettings {
    fn default() -> Self {
        Self {
            familiarization_trials: defaults::familiarization_trials(),
            end_control_trials: defaults::end_control_trials(),
            randomize_main_block: false,
            regenerate_on_restart: defaults::regenerate_on_restart(),
            live_prediction: false,
            seed: None,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            start_range_s: defaults::start_range_s(),
            wait_range_s: defaults::wait_range_s(),
            imagination_range_s: defaults::imagination_range_s(),
            intention_range_s: defaults::intention_range_s(),
            trial_timeout_s: defaults::trial_timeout_s(),
            success_hold_s: defaults::success_hold_s(),
            failure_cooldown_s: defaults::failure_cooldown_s(),
            tick_rate_hz: defaults::tick_rate_hz(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            torque_limit: defaults::torque_limit(),
            read_timeout_ms: defaults::read_timeout_ms(),
            offline_miss_threshold: defaults::offline_miss_threshold(),
            offline_debounce_ms: defaults::offline_debounce_ms(),
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            telemetry_interval_ms: defaults::telemetry_interval_ms(),
            event_poll_interval_ms: defaults::event_poll_interval_ms(),
            prediction_poll_interval_ms: defaults::prediction_poll_interval_ms(),
            prediction_timeout_ms: defaults::prediction_timeout_ms(),
        }
    }
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            screen_height_px: defaults::screen_height_px(),
            band_offset_px: defaults::band_offset_px(),
            band_width_px: defaults::band_width_px(),
            center_tolerance_px: defaults::center_tolerance_px(),
            min_position_deg: defaults::min_position_deg(),
            max_position_deg: defaults::max_position_deg(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            save_data: defaults::save_data(),
            results_dir: defaults::results_dir(),
            participant_id: 0,
        }
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            experiment: ExperimentSettings::default(),
            timing: TimingConfig::default(),
            device: DeviceConfig::default(),
            streaming: StreamingConfig::default(),
            geometry: GeometryConfig::default(),
            recording: RecordingConfig::default(),
            conditions: defaults::conditions(),
        }
    }
}

fn seconds(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

/// Configuration utility functions
impl ExperimentConfig {
    /// Validate configuration consistency
    pub fn validate_consistency(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let ranges = [
            ("start_range_s", self.timing.start_range_s),
            ("wait_range_s", self.timing.wait_range_s),
            ("imagination_range_s", self.timing.imagination_range_s),
            ("intention_range_s", self.timing.intention_range_s),
        ];
        for (name, [min, max]) in ranges {
            if !(min.is_finite() && max.is_finite()) || min < 0.0 || min > max {
                errors.push(format!(
                    "Dwell range {} must satisfy 0 <= min <= max, got [{}, {}]",
                    name, min, max
                ));
            }
        }

        if !(self.timing.trial_timeout_s > 0.0) {
            errors.push(format!(
                "Trial timeout must be positive, got {} s",
                self.timing.trial_timeout_s
            ));
        }

        for (name, value) in [
            ("success_hold_s", self.timing.success_hold_s),
            ("failure_cooldown_s", self.timing.failure_cooldown_s),
        ] {
            if !(value >= 0.0) {
                errors.push(format!("{} must be non-negative, got {}", name, value));
            }
        }

        if self.timing.tick_rate_hz < timing::MIN_CONTROLLER_TICK_HZ
            || self.timing.tick_rate_hz > timing::MAX_CONTROLLER_TICK_HZ
        {
            errors.push(format!(
                "Controller tick rate {} Hz outside [{}, {}]",
                self.timing.tick_rate_hz,
                timing::MIN_CONTROLLER_TICK_HZ,
                timing::MAX_CONTROLLER_TICK_HZ
            ));
        }

        if !(self.device.torque_limit > 0.0) || !self.device.torque_limit.is_finite() {
            errors.push(format!(
                "Torque limit must be positive, got {}",
                self.device.torque_limit
            ));
        }

        if self.device.read_timeout_ms == 0 || self.device.read_timeout_ms > device::MAX_READ_TIMEOUT_MS {
            errors.push(format!(
                "Device read timeout {} ms outside (0, {}]",
                self.device.read_timeout_ms,
                device::MAX_READ_TIMEOUT_MS
            ));
        }

        for (name, value) in [
            ("telemetry_interval_ms", self.streaming.telemetry_interval_ms),
            ("event_poll_interval_ms", self.streaming.event_poll_interval_ms),
            ("prediction_poll_interval_ms", self.streaming.prediction_poll_interval_ms),
        ] {
            if value == 0 {
                errors.push(format!("{} must be positive", name));
            }
        }

        let geometry = &self.geometry;
        if geometry.max_position_deg <= geometry.min_position_deg {
            errors.push(format!(
                "Arm position range [{}, {}] is empty",
                geometry.min_position_deg, geometry.max_position_deg
            ));
        }
        if geometry.screen_height_px <= 2.0 * (geometry.band_offset_px + geometry.band_width_px) {
            errors.push(format!(
                "Screen height {} px too small for bands (offset {} px, width {} px)",
                geometry.screen_height_px, geometry.band_offset_px, geometry.band_width_px
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Total number of trials the generated script will contain
    pub fn total_trials(&self) -> usize {
        self.experiment.familiarization_trials
            + self.conditions.iter().map(|c| c.trials).sum::<usize>()
            + self.experiment.end_control_trials
    }

    pub fn trial_timeout(&self) -> Duration {
        seconds(self.timing.trial_timeout_s)
    }

    pub fn success_hold(&self) -> Duration {
        seconds(self.timing.success_hold_s)
    }

    pub fn failure_cooldown(&self) -> Duration {
        seconds(self.timing.failure_cooldown_s)
    }

    /// Controller loop period
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.timing.tick_rate_hz.max(1) as f64)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.device.read_timeout_ms)
    }

    pub fn offline_debounce(&self) -> Duration {
        Duration::from_millis(self.device.offline_debounce_ms)
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.streaming.telemetry_interval_ms)
    }

    pub fn event_poll_interval(&self) -> Duration {
        Duration::from_millis(self.streaming.event_poll_interval_ms)
    }

    pub fn prediction_poll_interval(&self) -> Duration {
        Duration::from_millis(self.streaming.prediction_poll_interval_ms)
    }

    pub fn prediction_timeout(&self) -> Duration {
        Duration::from_millis(self.streaming.prediction_timeout_ms)
    }
}

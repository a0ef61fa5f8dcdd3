// src/config/constants.rs
//! Engine-wide configuration constants

/// Phase dwell and deadline constants (seconds unless noted)
pub mod timing {
    pub const DEFAULT_START_RANGE_S: [f64; 2] = [1.0, 2.0];
    pub const DEFAULT_WAIT_RANGE_S: [f64; 2] = [1.0, 2.0];
    pub const DEFAULT_IMAGINATION_RANGE_S: [f64; 2] = [2.0, 3.0];
    pub const DEFAULT_INTENTION_RANGE_S: [f64; 2] = [1.0, 2.0];
    pub const DEFAULT_TRIAL_TIMEOUT_S: f64 = 5.0;

    pub const SUCCESS_HOLD_S: f64 = 1.0;
    pub const FAILURE_COOLDOWN_S: f64 = 1.5;

    pub const DEFAULT_CONTROLLER_TICK_HZ: u32 = 60;
    pub const MIN_CONTROLLER_TICK_HZ: u32 = 10;
    pub const MAX_CONTROLLER_TICK_HZ: u32 = 1000;
}

/// Trial script constants
pub mod script {
    pub const DEFAULT_FAMILIARIZATION_TRIALS: usize = 2;
    pub const DEFAULT_END_CONTROL_TRIALS: usize = 2;
    pub const DEFAULT_CONDITION_TRIALS: usize = 8;
    pub const DEFAULT_CONDITION_MAGNITUDE: f64 = 2.0;

    pub const ASSIST_MODE_ASSIST: &str = "assist";
    pub const ASSIST_MODE_OPPOSE: &str = "oppose";
    pub const RANDOM_PROFILE: &str = "random";
}

/// Exoskeleton device constants
pub mod device {
    pub const DEFAULT_TORQUE_LIMIT: f64 = 3.0;
    pub const DEFAULT_READ_TIMEOUT_MS: u64 = 50;
    pub const MAX_READ_TIMEOUT_MS: u64 = 500;

    /// Consecutive missed samples tolerated before the link may be declared offline
    pub const DEFAULT_OFFLINE_MISS_THRESHOLD: u32 = 30;
    pub const DEFAULT_OFFLINE_DEBOUNCE_MS: u64 = 500;

    /// Wire direction codes
    pub const DIRECTION_UP_CODE: u8 = 10;
    pub const DIRECTION_DOWN_CODE: u8 = 20;

    /// Profile code reserved for the trial-over command
    pub const TRIAL_OVER_PROFILE_CODE: u8 = 99;
}

/// Telemetry bus constants
pub mod streaming {
    pub const DEFAULT_TELEMETRY_INTERVAL_MS: u64 = 10;
    pub const DEFAULT_EVENT_POLL_INTERVAL_MS: u64 = 2;
    /// 200 Hz cap on classifier polling
    pub const DEFAULT_PREDICTION_POLL_INTERVAL_MS: u64 = 5;
    pub const DEFAULT_PREDICTION_TIMEOUT_MS: u64 = 1;
    pub const HEALTH_CHANNEL_CAPACITY: usize = 16;
}

/// Discrete trial event codes pushed to the bus
pub mod events {
    pub const NO_EVENT: u8 = 99;
    pub const IMAGINE_UP: u8 = 10;
    pub const INTEND_UP: u8 = 11;
    pub const EXECUTE_UP: u8 = 12;
    pub const IMAGINE_DOWN: u8 = 20;
    pub const INTEND_DOWN: u8 = 21;
    pub const EXECUTE_DOWN: u8 = 22;
    pub const SUCCESS: u8 = 30;
    pub const FAILURE: u8 = 40;
    pub const TIMEOUT: u8 = 50;
}

/// Screen geometry used to map arm angle onto target zones
pub mod geometry {
    pub const DEFAULT_SCREEN_HEIGHT_PX: f64 = 820.0;
    pub const DEFAULT_BAND_OFFSET_PX: f64 = 100.0;
    pub const DEFAULT_BAND_WIDTH_PX: f64 = 80.0;
    pub const DEFAULT_CENTER_TOLERANCE_PX: f64 = 6.0;
    /// Share of the band that must be entered to count as reached
    pub const BAND_ENTRY_FRACTION: f64 = 0.9;

    pub const DEFAULT_MIN_POSITION_DEG: f64 = 55.0;
    pub const DEFAULT_MAX_POSITION_DEG: f64 = 180.0;
}

/// On-screen text
pub mod text {
    pub const INITIAL: &str = "Press ENTER when ready.";
    pub const FINISHED: &str = "EXPERIMENT FINISHED";
    pub const FINISHED_SUB: &str = "Press ESC to exit or ENTER to restart.";
    pub const TERMINATED: &str = "EXPERIMENT TERMINATED";
    pub const TERMINATED_SUB: &str = "Press ESC to exit.";
    pub const STREAM_OFFLINE: &str = "STREAM OFFLINE";
    pub const STREAM_OFFLINE_SUB: &str = "Press ESC to exit or press ENTER when stream is online";
    pub const PAUSED: &str = "PAUSED";
    pub const SUCCESS: &str = "SUCCESS";
    pub const FAILURE: &str = "FAIL";
    pub const TIMEOUT: &str = "TIMEOUT";
}

/// Recording and path constants
pub mod paths {
    pub const DEFAULT_CONFIG_FILE: &str = "exo_config.toml";
    pub const LOCAL_CONFIG_FILE: &str = "exo_config.local.toml";
    pub const DEFAULT_RESULTS_DIR: &str = "results";
    pub const ENV_PREFIX: &str = "EXO_";
}

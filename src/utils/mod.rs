//! Common utilities for the trial engine
//!
//! - Monotonic clock shared by the controller and the workers
//! - Arm angle to screen zone mapping
//! - Key edge detection for frontends
//! - Debounced link loss detection
//!
//! Tunable values live in the config module.

pub mod geometry;
pub mod input;
pub mod link;
pub mod time;

pub use geometry::{PositionMapper, Zones};
pub use input::{KeyEdges, KeyLevels};
pub use link::LinkMonitor;
pub use time::{unix_timestamp_secs, Clock, ManualClock, MonotonicClock, SharedClock};

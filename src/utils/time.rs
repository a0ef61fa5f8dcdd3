// src/utils/time.rs
//! Monotonic clock source shared by the controller and the workers

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Clock trait for dependency injection and testing
///
/// `now` is the time elapsed since the clock's epoch. All dwell and deadline
/// arithmetic uses one clock instance so readings from different threads agree.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;

    fn now_secs(&self) -> f64 {
        self.now().as_secs_f64()
    }

    fn elapsed_since(&self, earlier: Duration) -> Duration {
        self.now().saturating_sub(earlier)
    }
}

/// Shared handle to a clock
pub type SharedClock = Arc<dyn Clock>;

/// Real clock backed by `Instant`
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually driven clock for deterministic testing
#[derive(Debug, Default)]
pub struct ManualClock {
    current_nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn advance_by(&self, delta: Duration) {
        self.current_nanos
            .fetch_add(delta.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn advance_secs(&self, secs: f64) {
        self.advance_by(Duration::from_secs_f64(secs));
    }

    pub fn set_time(&self, at: Duration) {
        self.current_nanos.store(at.as_nanos() as u64, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.current_nanos.load(Ordering::Relaxed))
    }
}

/// Wall-clock seconds since the Unix epoch, used for recorded timestamps
pub fn unix_timestamp_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_advances() {
        let clock = MonotonicClock::new();
        let first = clock.now();
        std::thread::sleep(Duration::from_millis(2));
        assert!(clock.now() > first);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);

        clock.advance_secs(1.5);
        assert_eq!(clock.now(), Duration::from_millis(1500));

        clock.set_time(Duration::from_secs(10));
        assert_eq!(clock.elapsed_since(Duration::from_secs(4)), Duration::from_secs(6));
        assert_eq!(clock.elapsed_since(Duration::from_secs(12)), Duration::ZERO);
    }

    #[test]
    fn test_unix_timestamp_is_recent() {
        assert!(unix_timestamp_secs() > 1.6e9);
    }
}

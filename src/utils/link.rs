// src/utils/link.rs
//! Debounced detection of a lost exoskeleton link
//!
//! A single missed read is only a miss. The link is declared offline once
//! more than `miss_threshold` consecutive reads missed and at least
//! `debounce` has passed since the first of them; any sample brings it back.

use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct LinkMonitor {
    miss_threshold: u32,
    debounce: Duration,
    consecutive_misses: u32,
    first_miss_at: Option<Duration>,
    online: bool,
    total_misses: u64,
}

impl LinkMonitor {
    pub fn new(miss_threshold: u32, debounce: Duration) -> Self {
        Self {
            miss_threshold,
            debounce,
            consecutive_misses: 0,
            first_miss_at: None,
            online: true,
            total_misses: 0,
        }
    }

    /// A sample arrived
    pub fn record_sample(&mut self) -> bool {
        if !self.online {
            info!(missed = self.consecutive_misses, "Exoskeleton link back online");
        }
        self.consecutive_misses = 0;
        self.first_miss_at = None;
        self.online = true;
        self.online
    }

    /// A read returned nothing (timeout or error) at `now`
    pub fn record_miss(&mut self, now: Duration) -> bool {
        self.consecutive_misses = self.consecutive_misses.saturating_add(1);
        self.total_misses += 1;
        let first = *self.first_miss_at.get_or_insert(now);

        if self.online
            && self.consecutive_misses > self.miss_threshold
            && now.saturating_sub(first) >= self.debounce
        {
            warn!(
                missed = self.consecutive_misses,
                since_ms = now.saturating_sub(first).as_millis() as u64,
                "Exoskeleton link offline"
            );
            self.online = false;
        }
        self.online
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses
    }

    pub fn total_misses(&self) -> u64 {
        self.total_misses
    }
}

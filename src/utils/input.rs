// src/utils/input.rs
//! Raw key levels to one-shot edges and the pause latch

use crate::hal::InputEdges;

/// Key levels sampled by a frontend on one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyLevels {
    pub confirm: bool,
    pub cancel: bool,
    pub pause: bool,
}

/// Rising-edge detector; the pause key toggles a latch on each press
#[derive(Debug, Clone, Default)]
pub struct KeyEdges {
    previous: KeyLevels,
    pause_latch: bool,
}

impl KeyEdges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, levels: KeyLevels) -> InputEdges {
        let rising = |now: bool, before: bool| now && !before;

        if rising(levels.pause, self.previous.pause) {
            self.pause_latch = !self.pause_latch;
        }
        let edges = InputEdges {
            confirm: rising(levels.confirm, self.previous.confirm),
            cancel: rising(levels.cancel, self.previous.cancel),
            pause_latch: self.pause_latch,
        };
        self.previous = levels;
        edges
    }

    pub fn pause_latch(&self) -> bool {
        self.pause_latch
    }

    /// Drop the latch, e.g. after a restart
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

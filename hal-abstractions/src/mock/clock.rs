//! Mock clock driven by simulated time

use std::cell::Cell;
use std::rc::Rc;

use crate::clock::Clock;

/// Simulated millisecond clock
///
/// `delay_ms` advances simulated time instantly, so code that waits in a
/// loop runs to completion without sleeping.
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    now: Rc<Cell<u64>>,
    delays: Rc<Cell<u32>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock starting at `ms`
    pub fn starting_at(ms: u64) -> Self {
        let clock = Self::new();
        clock.set(ms);
        clock
    }

    pub fn set(&self, ms: u64) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get().saturating_add(ms));
    }

    /// Number of `delay_ms` calls so far
    pub fn delay_count(&self) -> u32 {
        self.delays.get()
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance(u64::from(ms));
        self.delays.set(self.delays.get().saturating_add(1));
    }
}

//! The clock.
//!
//! Time advances one tick each time a thread yields. While the CPU is idle
//! the clock jumps straight to the next timer interrupt that has work to do.

use crate::sbi::interrupt;

#[derive(Debug, Clone)]
pub struct Timer {
    ticks: u64,
    interval: u64,
}

impl Timer {
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn new(interval: u64) -> Self {
        assert!(interval > 0, "timer interval must be positive");
        Self { ticks: 0, interval }
    }

    pub fn now(&self) -> u64 {
        self.ticks
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Advance by one tick. Returns `true` if the timer interrupt fires.
    ///
    /// The clock stops at `u64::MAX`, where the interrupt always fires.
    pub fn tick(&mut self) -> bool {
        self.ticks = self.ticks.saturating_add(1);
        self.ticks == u64::MAX || self.ticks % self.interval == 0
    }

    /// Jump to the first interrupt that is both in the future and no earlier
    /// than `deadline`, or to the end of time if there is none.
    pub fn skip_to(&mut self, deadline: u64) {
        let target = deadline.max(self.ticks.saturating_add(1));
        self.ticks = match target % self.interval {
            0 => target,
            rem => (target - rem).saturating_add(self.interval),
        };
    }
}

/// Ticks since boot.
pub fn time() -> u64 {
    interrupt::disable().now()
}

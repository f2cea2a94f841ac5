//! Bounded fixed-delay retry

use std::thread;
use std::time::Duration;

/// Fixed delay between attempts with a hard attempt cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// Wait `delay` before the first attempt as well
    pub delay_first: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            delay_first: false,
        }
    }

    pub fn delayed_start(mut self) -> Self {
        self.delay_first = true;
        self
    }

    /// Single attempt, no waiting
    pub fn immediate() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Call `attempt` (1-based) until it returns `Some` or the cap is reached
    pub fn run<T>(&self, mut attempt: impl FnMut(u32) -> Option<T>) -> Option<T> {
        let attempts = self.max_attempts.max(1);
        for n in 1..=attempts {
            if n > 1 || self.delay_first {
                self.sleep();
            }
            if let Some(value) = attempt(n) {
                return Some(value);
            }
        }
        None
    }

    fn sleep(&self) {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

//! Bounded exponential backoff for reconnection

use std::time::Duration;

/// Doubling delay between a floor and a ceiling, bounded by an attempt count
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    max_attempts: u32,
    attempts: u32,
    next_delay: Duration,
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration, max_attempts: u32) -> Self {
        Self {
            floor,
            ceiling,
            max_attempts,
            attempts: 0,
            next_delay: floor,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        let delay = self.next_delay;
        self.next_delay = (delay * 2).min(self.ceiling);
        Some(delay)
    }

    /// Back to the floor delay with a zero attempt count
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.next_delay = self.floor;
    }

    /// Attempts scheduled since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

//! Bounded exponential backoff for readiness polling

use std::time::Duration;

/// Delay schedule: `initial`, doubling each step, capped at `max`, for
/// `attempts` steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub attempts: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, attempts: u32) -> Self {
        Self {
            initial,
            max,
            attempts,
        }
    }

    /// Schedule with no sleeping, for tests and dry runs.
    pub fn immediate(attempts: u32) -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, attempts)
    }

    /// Delay to wait after the given zero-based attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.initial
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// Iterate over every delay in the schedule.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.attempts).map(|attempt| self.delay(attempt))
    }
}

//! Reconnect delay calculation.

use std::time::Duration;

/// Exponential reconnect backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectBackoff {
    /// Delay before the first retry (default: 1000ms)
    pub base_delay_ms: u64,
    /// Upper bound for any delay (default: 15000ms)
    pub max_delay_ms: u64,
    /// Largest exponent applied to the base (default: 4, 16x)
    pub max_exponent: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 15000,
            max_exponent: 4,
        }
    }
}

impl ReconnectBackoff {
    /// Delay before retry number `attempt` (1-based)
    ///
    /// Formula: `min(base * 2^min(attempt-1, max_exponent), max_delay)`.
    /// Attempt 0 is treated as attempt 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(self.max_exponent);
        let multiplier = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Delay rounded to whole seconds for status text
pub fn whole_seconds(delay: Duration) -> u64 {
    (delay.as_millis() as u64 + 500) / 1000
}

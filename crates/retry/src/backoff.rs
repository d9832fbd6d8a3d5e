//! Exponential backoff with a cap and a per-kind multiplier.

use mendstream_config::RetryConfig;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base_ms: u64,
    /// Applied before the multiplier.
    pub cap_ms: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_ms: 1000,
            cap_ms: 10_000,
        }
    }
}

impl Backoff {
    pub fn new(base_ms: u64, cap_ms: u64) -> Self {
        Self { base_ms, cap_ms }
    }

    /// No waiting at all (replays and dry runs).
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.base_delay_ms, config.max_delay_ms)
    }

    /// `min(base * 2^attempt, cap) * multiplier`, saturating.
    pub fn delay_ms(&self, attempt: u32, multiplier: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        self.base_ms
            .saturating_mul(factor)
            .min(self.cap_ms)
            .saturating_mul(u64::from(multiplier))
    }

    pub fn delay(&self, attempt: u32, multiplier: u32) -> Duration {
        Duration::from_millis(self.delay_ms(attempt, multiplier))
    }
}

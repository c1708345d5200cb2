use std::time::Duration;

use serde::Deserialize;

/// Attempt budget and delay schedule for detail fetches and the other
/// requests retried through a reset.
///
/// `max_attempts` counts every item request, the first one included. The
/// delay before attempt `n` (1-based, `n >= 2`) grows geometrically from
/// `base_delay_ms` and is capped at `max_delay_ms`, giving the portal time
/// to settle its session before the next try.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: u32,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_500,
            multiplier: 2,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay_ms: u64::try_from(base_delay.as_millis()).unwrap_or(u64::MAX),
            ..Self::default()
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            multiplier: 1,
            max_delay_ms: 0,
        }
    }

    /// Always at least one attempt, even with a zero budget.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Wait before the given attempt (1-based). Zero for the first attempt.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(attempt - 2);
        let millis = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    pub async fn wait_before(&self, attempt: u32) {
        let delay = self.delay_before(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

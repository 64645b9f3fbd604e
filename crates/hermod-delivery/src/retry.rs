//! Backoff pacing between delivery attempts.
//!
//! Exponential backoff with additive bounded jitter, capped by a configured
//! maximum so late attempts do not drift into minutes.

use std::time::Duration;

use rand::Rng;

/// Retry pacing for one endpoint's delivery attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt (total attempts = retries + 1).
    pub retries: u32,
    /// Base delay for the exponential curve.
    pub base_backoff: Duration,
    /// Upper bound of the uniform random jitter added to each delay.
    pub jitter: Duration,
    /// Hard cap on any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_backoff: Duration::from_millis(800),
            jitter: Duration::from_millis(300),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Total attempts allowed per delivery round.
    pub fn max_attempts(&self) -> u32 {
        self.retries + 1
    }

    /// Delay before the attempt following `attempt` (1-based).
    ///
    /// `base * 2^(attempt-1)` plus jitter in `[0, jitter]`, capped at
    /// `max_backoff`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let exponential = self.base_backoff.saturating_mul(2_u32.saturating_pow(exponent));
        let delay = exponential.saturating_add(jitter_within(self.jitter));
        delay.min(self.max_backoff)
    }
}

/// Uniform random duration in `[0, bound]`.
fn jitter_within(bound: Duration) -> Duration {
    let bound_ms = bound.as_millis() as u64;
    if bound_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=bound_ms))
}

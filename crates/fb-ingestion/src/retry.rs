//! Bounded retry policy with exponential backoff and full jitter.

use crate::IngestionError;
use rand::Rng;
use std::time::Duration;

/// How many times to try and how long to wait between attempts.
///
/// # Example
///
/// ```rust
/// use fb_ingestion::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default()
///     .with_max_attempts(3)
///     .with_jitter(false);
///
/// assert_eq!(policy.delay_for(1), Duration::from_millis(500));
/// assert_eq!(policy.delay_for(2), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. At least 1.
    pub max_attempts: u32,

    /// Delay after the first failed attempt (before jitter).
    pub base_delay: Duration,

    /// Cap on the exponential delay.
    pub max_delay: Duration,

    /// Full jitter: pick uniformly in `[0, delay]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self::default().with_max_attempts(1)
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Whether `err`, raised by attempt number `attempt` (1-based), should
    /// be followed by another attempt.
    pub fn should_retry(&self, attempt: u32, err: &IngestionError) -> bool {
        err.is_transient() && attempt < self.max_attempts
    }

    /// Upper bound of the wait after failed attempt `attempt` (1-based):
    /// `base * 2^(attempt-1)`, capped at `max_delay`.
    pub fn ceiling_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Wait after failed attempt `attempt`, jittered if enabled.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling_for(attempt);
        if !self.jitter || ceiling.is_zero() {
            return ceiling;
        }
        let millis = ceiling.as_millis().min(u64::MAX as u128) as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    }

    /// Wait after a specific error. A provider `Retry-After` is a floor.
    pub fn delay_after(&self, attempt: u32, err: &IngestionError) -> Duration {
        let delay = self.delay_for(attempt);
        match err {
            IngestionError::RateLimited {
                retry_after: Some(retry_after),
            } => delay.max(*retry_after),
            _ => delay,
        }
    }
}

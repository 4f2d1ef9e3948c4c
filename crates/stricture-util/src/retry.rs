//! Retry policy for operations on the managed process

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shape of the delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// Delay doubles after every failed attempt, capped at `max_delay`
    Exponential { max_delay: Duration },
}

/// How often and how patiently a failed operation is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub delay: Duration,
    /// Total attempts allowed. None retries until cancelled.
    pub max_attempts: Option<u32>,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

    /// Retry forever with a fixed delay
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
            backoff: Backoff::Fixed,
        }
    }

    /// Retry forever without waiting. Intended for tests.
    pub fn immediate() -> Self {
        Self::fixed(Duration::ZERO)
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    pub fn with_exponential_backoff(mut self, max_delay: Duration) -> Self {
        self.backoff = Backoff::Exponential { max_delay };
        self
    }

    /// Whether another attempt may follow `attempt` failed attempts
    pub fn allows_retry(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt < max,
            None => true,
        }
    }

    /// Delay to wait after the `attempt`-th failure (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { max_delay } => {
                let exponent = attempt.saturating_sub(1).min(31);
                self.delay
                    .checked_mul(1u32 << exponent)
                    .unwrap_or(max_delay)
                    .min(max_delay)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Self::DEFAULT_DELAY)
    }
}

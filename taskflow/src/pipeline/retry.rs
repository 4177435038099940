//! Retry policies with configurable backoff and jitter strategies.
//!
//! The default policy waits a fixed delay between attempts with no jitter.
//! Linear and exponential backoff and jitter are opt-in.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default wait between attempts.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Default cap on any single wait.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Default retry budget for tasks built from configuration.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base
    #[default]
    Fixed,
    /// delay = base * (retry + 1)
    Linear,
    /// delay = base * 2^retry
    Exponential,
}

impl std::str::FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" | "constant" => Ok(Self::Fixed),
            "linear" => Ok(Self::Linear),
            "exponential" => Ok(Self::Exponential),
            other => Err(format!("unknown backoff strategy '{other}'")),
        }
    }
}

/// Jitter strategy applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

impl std::str::FromStr for JitterStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "full" => Ok(Self::Full),
            "equal" => Ok(Self::Equal),
            other => Err(format!("unknown jitter strategy '{other}'")),
        }
    }
}

/// How many times a task may be retried and how long to wait in between.
///
/// Total attempts are `max_retries + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: usize,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_MAX_RETRIES, Duration::from_millis(DEFAULT_RETRY_DELAY_MS))
    }
}

impl RetryPolicy {
    /// Bounded attempts with a fixed delay and no jitter.
    #[must_use]
    pub fn fixed(max_retries: usize, delay: Duration) -> Self {
        let base_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms: base_delay_ms.max(DEFAULT_MAX_DELAY_MS),
            backoff: BackoffStrategy::Fixed,
            jitter: JitterStrategy::None,
        }
    }

    /// A single attempt, never retried.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::fixed(0, Duration::ZERO)
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base delay, raising the cap if it would clip it.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.max_delay_ms = self.max_delay_ms.max(self.base_delay_ms);
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Total attempts permitted.
    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.max_retries.saturating_add(1)
    }

    /// Decides what happens after `failed_attempts` consecutive failures.
    #[must_use]
    pub fn decide(&self, failed_attempts: usize) -> RetryDecision {
        if failed_attempts > self.max_retries {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry(self.delay_for(failed_attempts.saturating_sub(1)))
        }
    }

    /// Calculates the wait before retry number `retry` (0-indexed).
    #[must_use]
    pub fn delay_for(&self, retry: usize) -> Duration {
        let base = self.base_delay_ms;
        let max = self.max_delay_ms;

        let delay = match self.backoff {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Linear => {
                let factor = u64::try_from(retry).unwrap_or(u64::MAX).saturating_add(1);
                base.saturating_mul(factor)
            }
            BackoffStrategy::Exponential => {
                let exp = u32::try_from(retry).unwrap_or(u32::MAX);
                base.saturating_mul(2u64.saturating_pow(exp))
            }
        }
        .min(max);

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more retries, give up.
    GiveUp,
}

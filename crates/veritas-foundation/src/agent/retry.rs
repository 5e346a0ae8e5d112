//! Retry policy for backend calls
//!
//! Transient backend failures are retried inside the model agent with a
//! configurable backoff; non-retryable failures (see
//! [`BackendError::is_retryable`]) end the attempt loop immediately.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use veritas_kernel::BackendError;

/// Wait between two attempts against the same backend.
///
/// ```yaml
/// backoff: { type: exponential, initial_delay_ms: 200, max_delay_ms: 5000, jitter_ms: 100 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed { delay_ms: u64 },
    /// Doubles per attempt up to `max_delay_ms`; `jitter_ms` spreads each
    /// step evenly around its nominal value.
    Exponential {
        initial_delay_ms: u64,
        max_delay_ms: u64,
        #[serde(default)]
        jitter_ms: u64,
    },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential {
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            jitter_ms: 100,
        }
    }
}

impl BackoffStrategy {
    /// Delay after the failed attempt `attempt` (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        let millis = match *self {
            Self::Fixed { delay_ms } => delay_ms,
            Self::Exponential {
                initial_delay_ms,
                max_delay_ms,
                jitter_ms,
            } => {
                let step = initial_delay_ms
                    .saturating_mul(1u64 << attempt.min(16))
                    .min(max_delay_ms);
                if jitter_ms == 0 {
                    step
                } else {
                    let spread = rand::thread_rng().gen_range(0..=jitter_ms);
                    (step + spread).saturating_sub(jitter_ms / 2)
                }
            }
        };
        Duration::from_millis(millis)
    }
}

/// Retry policy applied per backend by the model agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts per backend (including the first attempt)
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::default(),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no delay
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffStrategy::Fixed { delay_ms: 0 },
        }
    }

    pub fn with_max_attempts(max: u32) -> Self {
        Self {
            max_attempts: max.max(1),
            ..Default::default()
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Backoff before the next attempt, or `None` when sleeping it would use
    /// up the `remaining` time budget.
    pub fn delay_within(&self, attempt: u32, remaining: Duration) -> Option<Duration> {
        let delay = self.backoff.delay(attempt);
        (delay < remaining).then_some(delay)
    }

    /// Whether `error` on attempt `attempt` (0-indexed) warrants another try.
    pub fn should_retry(&self, attempt: u32, error: &BackendError) -> bool {
        attempt + 1 < self.max_attempts.max(1) && error.is_retryable()
    }
}

use crate::state::FailureKind;
use rand::Rng;
use std::time::Duration;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff with a cap and additive random jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on the exponential part of the delay.
    pub max_delay: Duration,
    /// Upper bound on the random delay added on top.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: Duration::from_millis(250),
        }
    }
}

/// Backoff before retry number `attempt` (0 = first retry).
///
/// Returns `base * 2^attempt`, capped at `cap`.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 1u32 << attempt.min(16);
    base.saturating_mul(factor).min(cap)
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Decide what to do after `attempt` attempts have been made.
    ///
    /// `attempt` is 1-based (1 = the first attempt just failed). Only
    /// retryable kinds are retried, at most `max_retries` times.
    pub fn decide(&self, attempt: u32, kind: FailureKind) -> RetryDecision {
        self.decide_retryable(attempt, kind.is_retryable())
    }

    /// Like [`decide`](Self::decide) for errors that override their kind's
    /// retryability.
    pub fn decide_retryable(&self, attempt: u32, retryable: bool) -> RetryDecision {
        if !retryable || attempt > self.max_retries {
            return RetryDecision::NoRetry;
        }

        let delay = backoff_delay(attempt.saturating_sub(1), self.base_delay, self.max_delay);
        RetryDecision::RetryAfter(delay + self.sample_jitter())
    }

    fn sample_jitter(&self) -> Duration {
        let max_ms = self.jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max_ms))
    }
}

//! Retry coordinator
//!
//! Wraps a single attempt with bounded retries. Only errors classified as
//! transient are retried; everything else surfaces on the first failure.
//! Backoff sleeps are interrupted by the cancel signal, and no new attempt
//! starts once the signal is raised.

mod classify;
mod policy;

pub use classify::{classify_http_status, classify_reqwest_error, Classify};
pub use policy::{backoff_delay, RetryDecision, RetryPolicy};

use crate::cancel::CancelSignal;
use crate::state::FailureKind;
use std::future::Future;
use tracing::warn;

/// Terminal outcome of a retried operation
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Succeeded(T),
    Failed { error: E, kind: FailureKind },
    Cancelled,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

/// Runs `op` until it succeeds, fails terminally, exhausts its retries, or the
/// run is cancelled.
///
/// `attempt_count` is the counter owned by the task or job; it is incremented
/// before every attempt and passed to `op`.
///
/// # Arguments
///
/// * `policy` - Retry limits and backoff
/// * `cancel` - Run-level cancel signal
/// * `attempt_count` - The task's attempt counter
/// * `label` - Identifies the work in log messages
/// * `op` - One attempt
pub async fn run_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancelSignal,
    attempt_count: &mut u32,
    label: &str,
    mut op: F,
) -> RetryOutcome<T, E>
where
    E: Classify + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    loop {
        if cancel.is_cancelled() {
            return RetryOutcome::Cancelled;
        }

        *attempt_count += 1;
        let error = match op(*attempt_count).await {
            Ok(value) => return RetryOutcome::Succeeded(value),
            Err(e) => e,
        };

        let kind = error.failure_kind();
        match policy.decide_retryable(*attempt_count, error.is_retryable()) {
            RetryDecision::NoRetry => return RetryOutcome::Failed { error, kind },
            RetryDecision::RetryAfter(delay) => {
                warn!(
                    "{}: attempt {} failed ({}), retrying in {}ms",
                    label,
                    attempt_count,
                    error,
                    delay.as_millis()
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return RetryOutcome::Cancelled,
                }
            }
        }
    }
}

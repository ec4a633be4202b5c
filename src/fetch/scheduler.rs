//! Concurrent fetch scheduler
//!
//! Dispatches feeds in the order produced by the ordering strategy onto a
//! bounded worker pool. A task needs one global slot for its whole lifetime
//! and one domain slot for each network attempt; the domain slot is released
//! as soon as the response body has been read, before the feed is parsed.
//! Requests to one domain are additionally spaced by `per_domain_delay`.
//!
//! Results are delivered in completion order, exactly once per dispatched
//! task. The cancel signal stops dispatching; in-flight tasks get a grace
//! period to drain, after which they are aborted and reported as cancelled.

use super::fetcher::{FetchCapability, FetchError};
use super::limiter::DomainLimiter;
use crate::cancel::CancelSignal;
use crate::config::SchedulerConfig;
use crate::model::{FeedDescriptor, FetchResult, FetchTask, TaskOutcome};
use crate::retry::{run_with_retry, RetryOutcome, RetryPolicy};
use crate::state::{FailureKind, RunStats};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Limits and timings for one scheduling run
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub global_concurrency: usize,
    pub per_domain_concurrency: usize,
    /// Minimum spacing between requests to the same domain
    pub per_domain_delay: Duration,
    pub retry: RetryPolicy,
    /// Upper bound on a single fetch attempt
    pub fetch_timeout: Duration,
    /// How long in-flight tasks may run after cancellation
    pub grace_period: Duration,
    /// Log a progress snapshot every N terminal results
    pub progress_interval: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

impl SchedulerSettings {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            global_concurrency: config.global_concurrency as usize,
            per_domain_concurrency: config.per_domain_concurrency as usize,
            per_domain_delay: config.per_domain_delay(),
            retry: config.retry_policy(),
            fetch_timeout: config.fetch_timeout(),
            grace_period: config.grace_period(),
            progress_interval: config.progress_interval,
        }
    }
}

/// What the scheduler did with the ordered input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScheduleReport {
    /// Tasks handed to a worker
    pub dispatched: usize,
    /// Tasks never dispatched because the run was cancelled
    pub not_submitted: usize,
    /// Tasks aborted after the grace period expired
    pub aborted: usize,
}

/// Bounded-parallelism fetch engine
pub struct FetchScheduler {
    fetcher: Arc<dyn FetchCapability>,
    settings: SchedulerSettings,
    cancel: CancelSignal,
}

impl FetchScheduler {
    /// Creates a scheduler over `fetcher`
    ///
    /// # Arguments
    ///
    /// * `fetcher` - The fetch capability used for every attempt
    /// * `settings` - Concurrency caps, retry policy and timings
    /// * `cancel` - Run-level cancel signal
    pub fn new(
        fetcher: Arc<dyn FetchCapability>,
        settings: SchedulerSettings,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            fetcher,
            settings,
            cancel,
        }
    }

    /// Runs every task and collects the results in completion order
    pub async fn schedule(
        &self,
        ordered: Vec<FeedDescriptor>,
        stats: &RunStats,
    ) -> (Vec<FetchResult>, ScheduleReport) {
        let mut results = Vec::with_capacity(ordered.len());
        let report = self
            .schedule_with(ordered, stats, |result| results.push(result))
            .await;
        (results, report)
    }

    /// Runs every task, handing each result to `on_result` as it completes
    ///
    /// `on_result` runs on the dispatcher, never concurrently with itself.
    /// Stats are recorded before `on_result` is called.
    pub async fn schedule_with<F>(
        &self,
        ordered: Vec<FeedDescriptor>,
        stats: &RunStats,
        mut on_result: F,
    ) -> ScheduleReport
    where
        F: FnMut(FetchResult),
    {
        let total = ordered.len();
        let global = Arc::new(Semaphore::new(self.settings.global_concurrency.max(1)));
        let domains = Arc::new(DomainLimiter::with_delay(
            self.settings.per_domain_concurrency,
            self.settings.per_domain_delay,
        ));
        let mut join_set: JoinSet<(usize, FetchResult)> = JoinSet::new();
        let mut in_flight: HashMap<usize, FetchTask> = HashMap::new();
        let mut report = ScheduleReport::default();

        info!(
            "Scheduling {} feeds (global {}, per-domain {})",
            total, self.settings.global_concurrency, self.settings.per_domain_concurrency
        );

        'dispatch: for (seq, descriptor) in ordered.into_iter().enumerate() {
            let permit = loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break 'dispatch,
                    Some(joined) = join_set.join_next(), if !join_set.is_empty() => {
                        self.handle_joined(joined, &mut in_flight, stats, &mut on_result);
                    }
                    permit = global.clone().acquire_owned() => match permit {
                        Ok(permit) => break permit,
                        Err(_) => {
                            error!("Global fetch limiter closed");
                            break 'dispatch;
                        }
                    },
                }
            };

            let task = FetchTask::new(descriptor);
            debug!("Dispatching {} ({})", task.descriptor.url, task.descriptor.domain);
            in_flight.insert(seq, task.clone());
            report.dispatched += 1;

            join_set.spawn(run_task(
                seq,
                task,
                permit,
                Arc::clone(&self.fetcher),
                Arc::clone(&domains),
                self.settings.retry,
                self.settings.fetch_timeout,
                self.cancel.clone(),
            ));
        }

        report.not_submitted = total - report.dispatched;
        if report.not_submitted > 0 {
            warn!(
                "Cancellation requested: {} feeds not submitted",
                report.not_submitted
            );
            stats.record_not_submitted(report.not_submitted as u64, FailureKind::Cancelled);
        }

        // Drain in-flight tasks; after cancellation they get a bounded grace period
        let mut deadline = self
            .cancel
            .is_cancelled()
            .then(|| Instant::now() + self.settings.grace_period);
        let mut aborted = false;

        while !join_set.is_empty() {
            match deadline {
                None => {
                    tokio::select! {
                        Some(joined) = join_set.join_next() => {
                            self.handle_joined(joined, &mut in_flight, stats, &mut on_result);
                        }
                        _ = self.cancel.cancelled() => {
                            warn!("Cancellation requested: draining {} in-flight feeds", join_set.len());
                            deadline = Some(Instant::now() + self.settings.grace_period);
                        }
                    }
                }
                Some(until) => {
                    tokio::select! {
                        Some(joined) = join_set.join_next() => {
                            self.handle_joined(joined, &mut in_flight, stats, &mut on_result);
                        }
                        _ = tokio::time::sleep_until(until) => {
                            warn!("Grace period expired: aborting {} feeds", join_set.len());
                            join_set.abort_all();
                            // Tasks that finished before the abort still report their results
                            while let Some(joined) = join_set.join_next().await {
                                self.handle_joined(joined, &mut in_flight, stats, &mut on_result);
                            }
                            aborted = true;
                        }
                    }
                }
            }
        }

        // Tasks that never reported back were aborted or panicked
        let mut leftovers: Vec<(usize, FetchTask)> = in_flight.into_iter().collect();
        leftovers.sort_by_key(|(seq, _)| *seq);
        for (_, task) in leftovers {
            let result = if aborted {
                report.aborted += 1;
                FetchResult::cancelled(task)
            } else {
                FetchResult::failed(task, FailureKind::Internal, "fetch worker panicked")
            };
            self.record(&result, stats);
            on_result(result);
        }

        report
    }

    fn handle_joined<F>(
        &self,
        joined: Result<(usize, FetchResult), JoinError>,
        in_flight: &mut HashMap<usize, FetchTask>,
        stats: &RunStats,
        on_result: &mut F,
    ) where
        F: FnMut(FetchResult),
    {
        match joined {
            Ok((seq, result)) => {
                in_flight.remove(&seq);
                self.record(&result, stats);
                on_result(result);
            }
            Err(e) if e.is_panic() => error!("Fetch worker panicked: {}", e),
            Err(_) => {}
        }
    }

    /// Records exactly one terminal outcome and logs progress at the interval
    fn record(&self, result: &FetchResult, stats: &RunStats) {
        let terminal = match result.outcome {
            TaskOutcome::Succeeded => {
                debug!("{}: {} items", result.task.descriptor.url, result.items.len());
                stats.record_success(Some(result.domain()), result.items.len() as u64)
            }
            TaskOutcome::Failed => {
                let kind = result.error.unwrap_or(FailureKind::Internal);
                warn!(
                    "{} failed after {} attempts: {} ({})",
                    result.task.descriptor.url,
                    result.task.attempt_count,
                    result.message.as_deref().unwrap_or("unknown error"),
                    kind
                );
                stats.record_failure(Some(result.domain()), kind)
            }
            TaskOutcome::Cancelled => stats.record_cancelled(),
        };

        if self.settings.progress_interval > 0 && terminal % self.settings.progress_interval == 0 {
            info!("Progress: {}", stats.snapshot());
        }
    }
}

/// One worker: retries the fetch while holding the global slot
#[allow(clippy::too_many_arguments)]
async fn run_task(
    seq: usize,
    mut task: FetchTask,
    global_permit: OwnedSemaphorePermit,
    fetcher: Arc<dyn FetchCapability>,
    domains: Arc<DomainLimiter>,
    policy: RetryPolicy,
    timeout: Duration,
    cancel: CancelSignal,
) -> (usize, FetchResult) {
    let descriptor = task.descriptor.clone();
    let label = descriptor.url.clone();

    let outcome = {
        let descriptor = &descriptor;
        let fetcher = &fetcher;
        let domains = &domains;
        let cancel_ref = &cancel;
        run_with_retry(
            &policy,
            &cancel,
            &mut task.attempt_count,
            &label,
            move |_attempt| async move {
                let domain_slot = tokio::select! {
                    slot = domains.acquire(&descriptor.domain) => slot.map_err(|_| {
                        FetchError::new(FailureKind::Internal, "domain limiter closed")
                    })?,
                    _ = cancel_ref.cancelled() => {
                        return Err(FetchError::new(
                            FailureKind::Cancelled,
                            "cancelled while waiting for a domain slot",
                        ));
                    }
                };

                let body =
                    match tokio::time::timeout(timeout, fetcher.fetch_body(descriptor, timeout))
                        .await
                    {
                        Ok(body) => body,
                        Err(_) => Err(FetchError::Timeout(timeout)),
                    };
                drop(domain_slot);

                fetcher.extract(descriptor, body?).await
            },
        )
        .await
    };
    drop(global_permit);

    let result = match outcome {
        RetryOutcome::Succeeded(items) => FetchResult::succeeded(task, items),
        RetryOutcome::Cancelled
        | RetryOutcome::Failed {
            kind: FailureKind::Cancelled,
            ..
        } => FetchResult::cancelled(task),
        RetryOutcome::Failed { error, kind } => FetchResult::failed(task, kind, error.to_string()),
    };
    (seq, result)
}

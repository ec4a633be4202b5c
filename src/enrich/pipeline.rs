//! Budget-bounded enrichment pipeline
//!
//! Items are submitted in order onto a bounded worker pool. Before an item is
//! dispatched its estimated cost is reserved with the budget tracker; the
//! first refused reservation stops submission of that item and every item
//! after it, while jobs already in flight run to completion. A job is charged
//! once: retries reuse the original reservation, success settles it with the
//! actual cost, and terminal failure or cancellation releases it.

use super::budget::{BudgetTracker, Reservation};
use super::client::{EnrichCapability, EnrichError};
use crate::throttle::DispatchThrottle;
use crate::cancel::CancelSignal;
use crate::config::EnrichmentConfig;
use crate::model::{EnrichmentJob, EnrichmentResult, EnrichmentStatus, RawItem};
use crate::retry::{run_with_retry, Classify, RetryOutcome, RetryPolicy};
use crate::state::{FailureKind, JobState, RunStats};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Limits and timings for one enrichment run
#[derive(Debug, Clone)]
pub struct EnrichSettings {
    pub workers: usize,
    pub retry: RetryPolicy,
    /// Minimum spacing between two API requests, retries included
    pub min_dispatch_interval: Duration,
    pub grace_period: Duration,
    pub progress_interval: u64,
}

impl Default for EnrichSettings {
    fn default() -> Self {
        Self::from_config(&EnrichmentConfig::default())
    }
}

impl EnrichSettings {
    pub fn from_config(config: &EnrichmentConfig) -> Self {
        Self {
            workers: config.workers as usize,
            retry: config.retry_policy(),
            min_dispatch_interval: config.min_dispatch_interval(),
            grace_period: config.grace_period(),
            progress_interval: config.progress_interval,
        }
    }
}

/// What the pipeline did with its input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnrichReport {
    pub dispatched: usize,
    /// Items never dispatched, because of the budget or cancellation
    pub not_submitted: usize,
    /// Jobs aborted after the grace period expired
    pub aborted: usize,
    /// True if a reservation was refused
    pub budget_exhausted: bool,
}

/// Tracks one job's lifecycle and logs illegal moves
#[derive(Debug)]
struct JobTracker {
    key: String,
    state: Mutex<JobState>,
}

impl JobTracker {
    fn new(key: &str, state: JobState) -> Self {
        Self {
            key: key.to_string(),
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> JobState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance(&self, next: JobState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.can_transition_to(next) {
            debug!("{}: {} -> {}", self.key, *state, next);
            *state = next;
            true
        } else {
            warn!("{}: illegal job transition {} -> {}", self.key, *state, next);
            false
        }
    }
}

/// Bounded-parallelism enrichment engine
pub struct EnrichPipeline {
    enricher: Arc<dyn EnrichCapability>,
    budget: Arc<BudgetTracker>,
    settings: EnrichSettings,
    cancel: CancelSignal,
}

impl EnrichPipeline {
    /// Creates a pipeline over `enricher`
    ///
    /// # Arguments
    ///
    /// * `enricher` - The enrichment capability used for every attempt
    /// * `budget` - Tracker holding the run's spending ceiling
    /// * `settings` - Worker count, retry policy and timings
    /// * `cancel` - Run-level cancel signal
    pub fn new(
        enricher: Arc<dyn EnrichCapability>,
        budget: Arc<BudgetTracker>,
        settings: EnrichSettings,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            enricher,
            budget,
            settings,
            cancel,
        }
    }

    pub fn budget(&self) -> &BudgetTracker {
        &self.budget
    }

    /// Enriches every item and collects the results in completion order
    pub async fn enrich(
        &self,
        items: Vec<RawItem>,
        stats: &RunStats,
    ) -> (Vec<EnrichmentResult>, EnrichReport) {
        let mut results = Vec::with_capacity(items.len());
        let report = self
            .enrich_with(items, stats, |result| results.push(result))
            .await;
        (results, report)
    }

    /// Enriches every item, handing each result to `on_result` as it completes
    ///
    /// Exactly one result is produced per input item, including items that
    /// were never submitted.
    pub async fn enrich_with<F>(
        &self,
        items: Vec<RawItem>,
        stats: &RunStats,
        mut on_result: F,
    ) -> EnrichReport
    where
        F: FnMut(EnrichmentResult),
    {
        let total = items.len();
        let workers = Arc::new(Semaphore::new(self.settings.workers.max(1)));
        let throttle = Arc::new(DispatchThrottle::new(self.settings.min_dispatch_interval));
        let mut join_set: JoinSet<(usize, EnrichmentResult)> = JoinSet::new();
        let mut in_flight: HashMap<usize, EnrichmentJob> = HashMap::new();
        let mut report = EnrichReport::default();
        let mut stopped: Option<(RawItem, FailureKind)> = None;
        let mut queue = items.into_iter().enumerate();

        info!(
            "Enriching {} items ({} workers, budget {})",
            total, self.settings.workers, self.budget
        );

        'dispatch: while let Some((seq, item)) = queue.next() {
            let permit = loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        stopped = Some((item, FailureKind::Cancelled));
                        break 'dispatch;
                    }
                    Some(joined) = join_set.join_next(), if !join_set.is_empty() => {
                        self.handle_joined(joined, &mut in_flight, stats, &mut on_result);
                    }
                    permit = workers.clone().acquire_owned() => match permit {
                        Ok(permit) => break permit,
                        Err(_) => {
                            error!("Enrichment worker pool closed");
                            stopped = Some((item, FailureKind::Internal));
                            break 'dispatch;
                        }
                    },
                }
            };

            let job = EnrichmentJob {
                item_key: item.natural_key().to_string(),
                estimated_cost_usd: self.enricher.estimate_cost(&item),
                attempt_count: 0,
            };

            let reservation = match self.budget.try_reserve(job.estimated_cost_usd) {
                Ok(reservation) => reservation,
                Err(exceeded) => {
                    warn!(
                        "{}; not submitting the remaining {} items",
                        exceeded,
                        total - seq
                    );
                    report.budget_exhausted = true;
                    stopped = Some((item, FailureKind::BudgetExceeded));
                    break 'dispatch;
                }
            };

            debug!(
                "Dispatching {} (estimate ${:.6})",
                job.item_key, job.estimated_cost_usd
            );
            in_flight.insert(seq, job.clone());
            report.dispatched += 1;

            join_set.spawn(run_job(
                seq,
                job,
                item,
                reservation,
                permit,
                Arc::clone(&self.enricher),
                Arc::clone(&self.budget),
                Arc::clone(&throttle),
                self.settings.retry,
                self.cancel.clone(),
            ));
        }

        if let Some((first, reason)) = stopped {
            let rest: Vec<RawItem> = std::iter::once(first)
                .chain(queue.map(|(_, item)| item))
                .collect();
            report.not_submitted = rest.len();
            stats.record_not_submitted(rest.len() as u64, reason);
            for item in rest {
                on_result(self.unsubmitted_result(&item, reason));
            }
        }

        // Drain in-flight jobs; after cancellation they get a bounded grace period
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
                            warn!("Cancellation requested: draining {} in-flight jobs", join_set.len());
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
                            warn!("Grace period expired: aborting {} jobs", join_set.len());
                            join_set.abort_all();
                            // Jobs that finished before the abort still report their results
                            while let Some(joined) = join_set.join_next().await {
                                self.handle_joined(joined, &mut in_flight, stats, &mut on_result);
                            }
                            aborted = true;
                        }
                    }
                }
            }
        }

        // Reservations held by aborted jobs stay committed
        let mut leftovers: Vec<(usize, EnrichmentJob)> = in_flight.into_iter().collect();
        leftovers.sort_by_key(|(seq, _)| *seq);
        for (_, job) in leftovers {
            let result = if aborted {
                report.aborted += 1;
                EnrichmentResult::cancelled(job)
            } else {
                EnrichmentResult::failed(job, FailureKind::Internal, "enrichment worker panicked")
            };
            self.record(&result, stats);
            on_result(result);
        }

        info!("Enrichment finished: {}", self.budget);
        report
    }

    /// Result for an item that never reached a worker; stats are recorded in bulk
    fn unsubmitted_result(&self, item: &RawItem, reason: FailureKind) -> EnrichmentResult {
        let job = EnrichmentJob {
            item_key: item.natural_key().to_string(),
            estimated_cost_usd: self.enricher.estimate_cost(item),
            attempt_count: 0,
        };
        let tracker = JobTracker::new(&job.item_key, JobState::Pending);
        match reason {
            FailureKind::BudgetExceeded => {
                tracker.advance(JobState::NotSubmitted);
                EnrichmentResult::not_submitted(job)
            }
            FailureKind::Cancelled => {
                tracker.advance(JobState::Cancelled);
                EnrichmentResult::cancelled(job)
            }
            kind => EnrichmentResult::failed(job, kind, "not submitted"),
        }
    }

    fn handle_joined<F>(
        &self,
        joined: Result<(usize, EnrichmentResult), JoinError>,
        in_flight: &mut HashMap<usize, EnrichmentJob>,
        stats: &RunStats,
        on_result: &mut F,
    ) where
        F: FnMut(EnrichmentResult),
    {
        match joined {
            Ok((seq, result)) => {
                in_flight.remove(&seq);
                self.record(&result, stats);
                on_result(result);
            }
            Err(e) if e.is_panic() => error!("Enrichment worker panicked: {}", e),
            Err(_) => {}
        }
    }

    /// Records exactly one terminal outcome and logs progress at the interval
    fn record(&self, result: &EnrichmentResult, stats: &RunStats) {
        let terminal = match result.status {
            EnrichmentStatus::Succeeded => {
                stats.record_cost(result.actual_cost_usd, result.tokens_used);
                stats.record_success(None, 1)
            }
            EnrichmentStatus::Failed => {
                let kind = result.error.unwrap_or(FailureKind::Internal);
                warn!(
                    "{} failed after {} attempts: {} ({})",
                    result.job.item_key,
                    result.job.attempt_count,
                    result.message.as_deref().unwrap_or("unknown error"),
                    kind
                );
                stats.record_failure(None, kind)
            }
            EnrichmentStatus::Cancelled => stats.record_cancelled(),
            EnrichmentStatus::NotSubmitted => {
                stats.record_not_submitted(1, FailureKind::BudgetExceeded)
            }
        };

        if self.settings.progress_interval > 0 && terminal % self.settings.progress_interval == 0 {
            info!("Progress: {} | {}", stats.snapshot(), self.budget);
        }
    }
}

/// One worker: retries the job while holding its worker slot and reservation
#[allow(clippy::too_many_arguments)]
async fn run_job(
    seq: usize,
    mut job: EnrichmentJob,
    item: RawItem,
    reservation: Reservation,
    worker_permit: OwnedSemaphorePermit,
    enricher: Arc<dyn EnrichCapability>,
    budget: Arc<BudgetTracker>,
    throttle: Arc<DispatchThrottle>,
    policy: RetryPolicy,
    cancel: CancelSignal,
) -> (usize, EnrichmentResult) {
    let tracker = JobTracker::new(&job.item_key, JobState::Reserved);
    let label = job.item_key.clone();

    let outcome = {
        let item = &item;
        let enricher = &enricher;
        let throttle = &throttle;
        let tracker = &tracker;
        let cancel_ref = &cancel;
        let max_retries = policy.max_retries;
        run_with_retry(
            &policy,
            &cancel,
            &mut job.attempt_count,
            &label,
            move |attempt| async move {
                // A retry goes back to Reserved on the original reservation
                if tracker.state() == JobState::FailedRetryable {
                    tracker.advance(JobState::Reserved);
                }

                tokio::select! {
                    _ = throttle.wait() => {}
                    _ = cancel_ref.cancelled() => {
                        return Err(EnrichError::new(
                            FailureKind::Cancelled,
                            "cancelled while waiting to dispatch",
                        ));
                    }
                }

                tracker.advance(JobState::InFlight);
                let result = enricher.enrich(item).await;
                if let Err(e) = &result {
                    let next = if e.is_retryable() && attempt <= max_retries {
                        JobState::FailedRetryable
                    } else {
                        JobState::FailedTerminal
                    };
                    tracker.advance(next);
                }
                result
            },
        )
        .await
    };
    drop(worker_permit);

    let result = match outcome {
        RetryOutcome::Succeeded(output) => {
            tracker.advance(JobState::Succeeded);
            budget.settle(reservation, output.cost_usd);
            EnrichmentResult::succeeded(job, output)
        }
        RetryOutcome::Cancelled
        | RetryOutcome::Failed {
            kind: FailureKind::Cancelled,
            ..
        } => {
            tracker.advance(JobState::Cancelled);
            budget.release(reservation);
            EnrichmentResult::cancelled(job)
        }
        RetryOutcome::Failed { error, kind } => {
            budget.release(reservation);
            EnrichmentResult::failed(job, kind, error.to_string())
        }
    };
    (seq, result)
}

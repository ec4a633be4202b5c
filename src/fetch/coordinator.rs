//! Fetch run orchestration
//!
//! Ties the pieces of a fetch run together:
//! - Opening storage and recording the run
//! - Ordering the catalog
//! - Scheduling the fetches and persisting each result as it completes
//! - Writing the final summary back to the run record

use super::fetcher::{build_http_client, FetchCapability, HttpFeedFetcher};
use super::ordering::order_feeds;
use super::scheduler::{FetchScheduler, SchedulerSettings};
use crate::cancel::CancelSignal;
use crate::config::Config;
use crate::model::FetchResult;
use crate::state::{RunStats, RunSummary, StopReason};
use crate::storage::{RunKind, SqliteStorage, Storage, StorageResult, UpsertOutcome};
use crate::HarvestError;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Counts of rows written while persisting results
#[derive(Debug, Default, Clone, Copy)]
struct PersistTally {
    inserted: u64,
    updated: u64,
    errors: u64,
}

/// Main fetch coordinator structure
pub struct FetchCoordinator {
    config: Config,
    storage: SqliteStorage,
    fetcher: Arc<dyn FetchCapability>,
    cancel: CancelSignal,
    run_id: i64,
}

impl FetchCoordinator {
    /// Creates a coordinator that fetches over HTTP
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `config_hash` - Hash recorded with the run
    /// * `cancel` - Run-level cancel signal
    ///
    /// # Returns
    ///
    /// * `Ok(FetchCoordinator)` - Storage opened and run recorded
    /// * `Err(HarvestError)` - Failed to initialize
    pub fn new(config: Config, config_hash: &str, cancel: CancelSignal) -> Result<Self, HarvestError> {
        let client = build_http_client(&config.user_agent)?;
        let fetcher = Arc::new(HttpFeedFetcher::new(client, config.scheduler.daily_window));
        Self::with_fetcher(config, config_hash, fetcher, cancel)
    }

    /// Creates a coordinator around an arbitrary fetch capability
    pub fn with_fetcher(
        config: Config,
        config_hash: &str,
        fetcher: Arc<dyn FetchCapability>,
        cancel: CancelSignal,
    ) -> Result<Self, HarvestError> {
        let mut storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
        let run_id = storage.create_run(RunKind::Fetch, config_hash)?;

        Ok(Self {
            config,
            storage,
            fetcher,
            cancel,
            run_id,
        })
    }

    /// ID of the run record this coordinator writes to
    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Runs the fetch pipeline over the whole catalog
    ///
    /// Store failures are logged and do not stop the run. The returned
    /// summary has also been written to the run record.
    pub async fn run(&mut self) -> Result<RunSummary, HarvestError> {
        let descriptors = self.config.feed_descriptors()?;
        let ordered = order_feeds(self.config.scheduler.ordering, &descriptors);
        let stats = RunStats::new(ordered.len() as u64);

        info!(
            "Starting fetch run {} over {} feeds",
            self.run_id,
            ordered.len()
        );

        let scheduler = FetchScheduler::new(
            Arc::clone(&self.fetcher),
            SchedulerSettings::from_config(&self.config.scheduler),
            self.cancel.clone(),
        );

        let run_id = self.run_id;
        let storage = &mut self.storage;
        let mut tally = PersistTally::default();

        let report = scheduler
            .schedule_with(ordered, &stats, |result| {
                if let Err(e) = persist_result(storage, &result, run_id, &mut tally) {
                    tally.errors += 1;
                    error!(
                        "Failed to store result for {}: {}",
                        result.task.descriptor.url, e
                    );
                }
            })
            .await;

        let stop_reason = if self.cancel.is_cancelled() {
            warn!(
                "Fetch run {} cancelled ({} not submitted, {} aborted)",
                run_id, report.not_submitted, report.aborted
            );
            StopReason::Cancelled
        } else {
            StopReason::Completed
        };

        let summary = stats.summary(stop_reason);
        self.storage.finish_run(run_id, &summary)?;

        info!(
            "Fetch run {} finished: {} new articles, {} updated, {} store errors",
            run_id, tally.inserted, tally.updated, tally.errors
        );

        Ok(summary)
    }
}

/// Upserts a result's items and the feed's status
fn persist_result(
    storage: &mut SqliteStorage,
    result: &FetchResult,
    run_id: i64,
    tally: &mut PersistTally,
) -> StorageResult<()> {
    for item in &result.items {
        match storage.upsert_article(item, run_id)? {
            UpsertOutcome::Inserted => tally.inserted += 1,
            UpsertOutcome::Updated => tally.updated += 1,
        }
    }
    storage.record_feed_status(result, run_id)
}

//! Enrichment run orchestration
//!
//! Loads stored articles that have no enrichment yet, runs them through the
//! budget-bounded pipeline and stores each successful analysis as it arrives.

use super::budget::BudgetTracker;
use super::client::{ChatCompletionEnricher, EnrichCapability};
use super::pipeline::{EnrichPipeline, EnrichSettings};
use crate::cancel::CancelSignal;
use crate::config::Config;
use crate::model::EnrichmentResult;
use crate::state::{RunStats, RunSummary, StopReason};
use crate::storage::{EnrichmentRecord, RunKind, SqliteStorage, Storage};
use crate::{ConfigError, HarvestError};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Per-run overrides from the command line
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnrichOptions {
    /// Enrich at most this many articles
    pub limit: Option<usize>,
    /// Replaces the configured budget ceiling
    pub max_cost_usd: Option<f64>,
}

/// Main enrichment coordinator structure
pub struct EnrichCoordinator {
    config: Config,
    storage: SqliteStorage,
    enricher: Arc<dyn EnrichCapability>,
    cancel: CancelSignal,
    run_id: i64,
}

impl EnrichCoordinator {
    /// Creates a coordinator using the configured chat-completions API
    ///
    /// # Returns
    ///
    /// * `Ok(EnrichCoordinator)` - API key found, storage opened, run recorded
    /// * `Err(HarvestError)` - Failed to initialize
    pub fn new(config: Config, config_hash: &str, cancel: CancelSignal) -> Result<Self, HarvestError> {
        let enricher = Arc::new(ChatCompletionEnricher::from_env(config.ai.clone())?);
        Self::with_enricher(config, config_hash, enricher, cancel)
    }

    /// Creates a coordinator around an arbitrary enrichment capability
    pub fn with_enricher(
        config: Config,
        config_hash: &str,
        enricher: Arc<dyn EnrichCapability>,
        cancel: CancelSignal,
    ) -> Result<Self, HarvestError> {
        let mut storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
        let run_id = storage.create_run(RunKind::Enrich, config_hash)?;

        Ok(Self {
            config,
            storage,
            enricher,
            cancel,
            run_id,
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Enriches pending articles until done, out of budget, or cancelled
    pub async fn run(&mut self, options: EnrichOptions) -> Result<RunSummary, HarvestError> {
        let ceiling = options
            .max_cost_usd
            .unwrap_or(self.config.enrichment.budget_ceiling_usd);
        if !ceiling.is_finite() || ceiling < 0.0 {
            return Err(ConfigError::Validation(format!(
                "max cost must be a non-negative amount, got {}",
                ceiling
            ))
            .into());
        }
        let limit = options.limit.or(self.config.enrichment.batch_limit);

        let items: Vec<_> = self
            .storage
            .articles_pending_enrichment(self.config.enrichment.min_content_chars, limit)?
            .iter()
            .map(|article| article.to_raw_item())
            .collect();

        info!(
            "Starting enrichment run {}: {} articles pending, ceiling ${:.2}",
            self.run_id,
            items.len(),
            ceiling
        );

        let stats = RunStats::new(items.len() as u64);
        let pipeline = EnrichPipeline::new(
            Arc::clone(&self.enricher),
            Arc::new(BudgetTracker::new(ceiling)),
            EnrichSettings::from_config(&self.config.enrichment),
            self.cancel.clone(),
        );

        let run_id = self.run_id;
        let model = self.config.ai.model.clone();
        let storage = &mut self.storage;
        let mut stored = 0u64;

        let report = pipeline
            .enrich_with(items, &stats, |result| {
                if let Some(record) = to_record(&result, &model) {
                    match storage.upsert_enrichment(&record, run_id) {
                        Ok(_) => stored += 1,
                        Err(e) => error!(
                            "Failed to store enrichment for {}: {}",
                            record.article_url, e
                        ),
                    }
                }
            })
            .await;

        let stop_reason = if self.cancel.is_cancelled() {
            warn!("Enrichment run {} cancelled", run_id);
            StopReason::Cancelled
        } else if report.budget_exhausted {
            warn!(
                "Enrichment run {} stopped at the budget ceiling ({} items not submitted)",
                run_id, report.not_submitted
            );
            StopReason::BudgetExhausted
        } else {
            StopReason::Completed
        };

        let summary = stats.summary(stop_reason);
        self.storage.finish_run(run_id, &summary)?;

        info!(
            "Enrichment run {} finished: {} analyses stored, ${:.4} spent",
            run_id,
            stored,
            pipeline.budget().spent_usd()
        );

        Ok(summary)
    }
}

/// Storage row for a successful result
fn to_record(result: &EnrichmentResult, model: &str) -> Option<EnrichmentRecord> {
    if !result.success() {
        return None;
    }
    Some(EnrichmentRecord {
        article_url: result.job.item_key.clone(),
        outputs: result.outputs.clone()?,
        tokens_used: result.tokens_used,
        cost_usd: result.actual_cost_usd,
        model: model.to_string(),
    })
}

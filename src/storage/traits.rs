//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::model::{FetchResult, RawItem};
use crate::state::RunSummary;
use crate::storage::{
    ArticleRecord, EnrichmentRecord, RunKind, RunRecord, RunStatus, StoreStatistics, UpsertOutcome,
};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every write is an idempotent upsert keyed by a natural key, so a unit of
/// work persisted twice leaves one row.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new run in the `running` state
    ///
    /// # Arguments
    ///
    /// * `kind` - Fetch or enrichment
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, kind: RunKind, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Updates the status of a run
    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Stores the final summary and marks the run finished
    fn finish_run(&mut self, run_id: i64, summary: &RunSummary) -> StorageResult<()>;

    // ===== Articles =====

    /// Inserts an article or updates the existing row with the same URL
    fn upsert_article(&mut self, item: &RawItem, run_id: i64) -> StorageResult<UpsertOutcome>;

    /// Gets an article by URL
    fn get_article(&self, url: &str) -> StorageResult<Option<ArticleRecord>>;

    /// Articles without enrichment output whose content is long enough
    ///
    /// Oldest first, at most `limit` when given.
    fn articles_pending_enrichment(
        &self,
        min_content_chars: usize,
        limit: Option<usize>,
    ) -> StorageResult<Vec<ArticleRecord>>;

    // ===== Feed Status =====

    /// Records the outcome of the latest fetch of a feed
    fn record_feed_status(&mut self, result: &FetchResult, run_id: i64) -> StorageResult<()>;

    // ===== Enrichment =====

    /// Inserts or replaces the enrichment output for an article
    fn upsert_enrichment(&mut self, record: &EnrichmentRecord, run_id: i64)
        -> StorageResult<UpsertOutcome>;

    /// Gets the enrichment output for an article
    fn get_enrichment(&self, article_url: &str) -> StorageResult<Option<EnrichmentRecord>>;

    // ===== Statistics =====

    /// Aggregate counts over the whole database
    fn statistics(&self) -> StorageResult<StoreStatistics>;
}

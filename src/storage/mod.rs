//! Storage module for persisting harvest data
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Idempotent article and enrichment upserts keyed by URL
//! - Per-feed fetch status
//! - Run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::model::RawItem;
use crate::state::StopReason;
use crate::HarvestError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(HarvestError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    SqliteStorage::new(path)
}

/// Whether an upsert created a row or replaced one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Represents a stored article
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRecord {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub published_at: Option<String>,
    pub source_domain: String,
    pub source_feed: String,
    pub theme: String,
    pub raw_content: String,
    pub first_seen_run: i64,
    pub fetched_at: String,
}

impl ArticleRecord {
    /// Converts the stored row back into the item it was built from
    ///
    /// Unparseable timestamps become `None`.
    pub fn to_raw_item(&self) -> RawItem {
        RawItem {
            url: self.url.clone(),
            title: self.title.clone(),
            published_at: self
                .published_at
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            source_domain: self.source_domain.clone(),
            source_feed: self.source_feed.clone(),
            theme: self.theme.clone(),
            raw_content: self.raw_content.clone(),
        }
    }
}

/// Enrichment output stored for one article
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentRecord {
    pub article_url: String,
    pub outputs: serde_json::Value,
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub model: String,
}

/// Represents a fetch or enrichment run
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub id: i64,
    pub kind: RunKind,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub tasks_total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub not_submitted: u64,
    pub items_produced: u64,
    pub total_cost_usd: f64,
    pub duration_ms: u64,
}

/// Aggregate view of the database for the statistics report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStatistics {
    pub total_articles: u64,
    pub enriched_articles: u64,
    /// Article counts per source domain, largest first
    pub articles_by_domain: Vec<(String, u64)>,
    /// Article counts per theme, largest first
    pub articles_by_theme: Vec<(String, u64)>,
    /// Feed counts per last fetch status
    pub feeds_by_status: Vec<(String, u64)>,
    pub enrichment_tokens: u64,
    pub enrichment_cost_usd: f64,
    pub total_runs: u64,
}

/// Which pipeline a run executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Fetch,
    Enrich,
}

impl RunKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Enrich => "enrich",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "fetch" => Some(Self::Fetch),
            "enrich" => Some(Self::Enrich),
            _ => None,
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
    BudgetExhausted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::BudgetExhausted => "budget_exhausted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "budget_exhausted" => Some(Self::BudgetExhausted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl From<StopReason> for RunStatus {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::Completed => Self::Completed,
            StopReason::Cancelled => Self::Cancelled,
            StopReason::BudgetExhausted => Self::BudgetExhausted,
            StopReason::Failed => Self::Failed,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

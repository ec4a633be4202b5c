//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::model::{FetchResult, RawItem};
use crate::state::RunSummary;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    ArticleRecord, EnrichmentRecord, RunKind, RunRecord, RunStatus, StoreStatistics, UpsertOutcome,
};
use crate::HarvestError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const RUN_COLUMNS: &str = "id, kind, started_at, finished_at, config_hash, status, tasks_total, \
     succeeded, failed, cancelled, not_submitted, items_produced, total_cost_usd, duration_ms";

const ARTICLE_COLUMNS: &str = "id, url, title, published_at, source_domain, source_feed, theme, \
     raw_content, first_seen_run, fetched_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as u64)
    }

    fn grouped_counts(&self, sql: &str) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        kind: RunKind::from_db_string(&row.get::<_, String>(1)?).unwrap_or(RunKind::Fetch),
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        config_hash: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?).unwrap_or(RunStatus::Running),
        tasks_total: row.get::<_, i64>(6)? as u64,
        succeeded: row.get::<_, i64>(7)? as u64,
        failed: row.get::<_, i64>(8)? as u64,
        cancelled: row.get::<_, i64>(9)? as u64,
        not_submitted: row.get::<_, i64>(10)? as u64,
        items_produced: row.get::<_, i64>(11)? as u64,
        total_cost_usd: row.get(12)?,
        duration_ms: row.get::<_, i64>(13)? as u64,
    })
}

fn article_from_row(row: &Row<'_>) -> rusqlite::Result<ArticleRecord> {
    Ok(ArticleRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        published_at: row.get(3)?,
        source_domain: row.get(4)?,
        source_feed: row.get(5)?,
        theme: row.get(6)?,
        raw_content: row.get(7)?,
        first_seen_run: row.get(8)?,
        fetched_at: row.get(9)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, kind: RunKind, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (kind, started_at, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
            params![
                kind.to_db_string(),
                now,
                config_hash,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let sql = format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS);
        Ok(self.conn.query_row(&sql, [], run_from_row).optional()?)
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1 WHERE id = ?2",
            params![status.to_db_string(), run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn finish_run(&mut self, run_id: i64, summary: &RunSummary) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let status = RunStatus::from(summary.stop_reason);
        let updated = self.conn.execute(
            "UPDATE runs SET finished_at = ?1, status = ?2, tasks_total = ?3, succeeded = ?4,
                 failed = ?5, cancelled = ?6, not_submitted = ?7, items_produced = ?8,
                 total_cost_usd = ?9, duration_ms = ?10
             WHERE id = ?11",
            params![
                now,
                status.to_db_string(),
                summary.tasks_total as i64,
                summary.succeeded as i64,
                summary.failed as i64,
                summary.cancelled as i64,
                summary.not_submitted as i64,
                summary.items_produced as i64,
                summary.total_cost_usd,
                summary.duration_ms as i64,
                run_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Articles =====

    fn upsert_article(&mut self, item: &RawItem, run_id: i64) -> StorageResult<UpsertOutcome> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM articles WHERE url = ?1",
                params![item.natural_key()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        self.conn.execute(
            "INSERT INTO articles (url, title, published_at, source_domain, source_feed, theme,
                                   raw_content, first_seen_run, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(url) DO UPDATE SET
                 title = excluded.title,
                 published_at = COALESCE(excluded.published_at, articles.published_at),
                 source_domain = excluded.source_domain,
                 source_feed = excluded.source_feed,
                 theme = excluded.theme,
                 raw_content = excluded.raw_content,
                 fetched_at = excluded.fetched_at",
            params![
                item.natural_key(),
                item.title,
                item.published_at.map(|dt| dt.to_rfc3339()),
                item.source_domain,
                item.source_feed,
                item.theme,
                item.raw_content,
                run_id,
                Utc::now().to_rfc3339()
            ],
        )?;

        Ok(if exists {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    fn get_article(&self, url: &str) -> StorageResult<Option<ArticleRecord>> {
        let sql = format!("SELECT {} FROM articles WHERE url = ?1", ARTICLE_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![url], article_from_row)
            .optional()?)
    }

    fn articles_pending_enrichment(
        &self,
        min_content_chars: usize,
        limit: Option<usize>,
    ) -> StorageResult<Vec<ArticleRecord>> {
        let sql = format!(
            "SELECT {} FROM articles a
             WHERE LENGTH(a.raw_content) >= ?1
               AND NOT EXISTS (SELECT 1 FROM article_enrichment e WHERE e.article_url = a.url)
             ORDER BY a.id
             LIMIT ?2",
            "a.id, a.url, a.title, a.published_at, a.source_domain, a.source_feed, a.theme, \
             a.raw_content, a.first_seen_run, a.fetched_at"
        );
        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.map_or(-1, |n| n as i64);

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![min_content_chars as i64, limit], article_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ===== Feed Status =====

    fn record_feed_status(&mut self, result: &FetchResult, run_id: i64) -> StorageResult<()> {
        let descriptor = &result.task.descriptor;
        self.conn.execute(
            "INSERT INTO feed_status (feed_url, domain, status, error_kind, error_message, items,
                                      attempts, run_id, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(feed_url) DO UPDATE SET
                 domain = excluded.domain,
                 status = excluded.status,
                 error_kind = excluded.error_kind,
                 error_message = excluded.error_message,
                 items = excluded.items,
                 attempts = excluded.attempts,
                 run_id = excluded.run_id,
                 updated_at = excluded.updated_at",
            params![
                descriptor.url,
                descriptor.domain,
                result.outcome.to_string(),
                result.error.map(|k| k.to_db_string()),
                result.message,
                result.items.len() as i64,
                result.task.attempt_count as i64,
                run_id,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    // ===== Enrichment =====

    fn upsert_enrichment(
        &mut self,
        record: &EnrichmentRecord,
        run_id: i64,
    ) -> StorageResult<UpsertOutcome> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM article_enrichment WHERE article_url = ?1",
                params![record.article_url],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        let outputs = serde_json::to_string(&record.outputs)?;
        self.conn.execute(
            "INSERT INTO article_enrichment (article_url, outputs, tokens_used, cost_usd, model,
                                             run_id, enriched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(article_url) DO UPDATE SET
                 outputs = excluded.outputs,
                 tokens_used = excluded.tokens_used,
                 cost_usd = excluded.cost_usd,
                 model = excluded.model,
                 run_id = excluded.run_id,
                 enriched_at = excluded.enriched_at",
            params![
                record.article_url,
                outputs,
                record.tokens_used as i64,
                record.cost_usd,
                record.model,
                run_id,
                Utc::now().to_rfc3339()
            ],
        )?;

        Ok(if exists {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    fn get_enrichment(&self, article_url: &str) -> StorageResult<Option<EnrichmentRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT article_url, outputs, tokens_used, cost_usd, model
                 FROM article_enrichment WHERE article_url = ?1",
                params![article_url],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((article_url, outputs, tokens_used, cost_usd, model)) => {
                Ok(Some(EnrichmentRecord {
                    article_url,
                    outputs: serde_json::from_str(&outputs)?,
                    tokens_used: tokens_used as u64,
                    cost_usd,
                    model,
                }))
            }
            None => Ok(None),
        }
    }

    // ===== Statistics =====

    fn statistics(&self) -> StorageResult<StoreStatistics> {
        let (enrichment_tokens, enrichment_cost_usd): (i64, f64) = self.conn.query_row(
            "SELECT COALESCE(SUM(tokens_used), 0), COALESCE(SUM(cost_usd), 0.0)
             FROM article_enrichment",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(StoreStatistics {
            total_articles: self.count("SELECT COUNT(*) FROM articles")?,
            enriched_articles: self.count("SELECT COUNT(*) FROM article_enrichment")?,
            articles_by_domain: self.grouped_counts(
                "SELECT source_domain, COUNT(*) AS n FROM articles
                 GROUP BY source_domain ORDER BY n DESC, source_domain",
            )?,
            articles_by_theme: self.grouped_counts(
                "SELECT theme, COUNT(*) AS n FROM articles GROUP BY theme ORDER BY n DESC, theme",
            )?,
            feeds_by_status: self.grouped_counts(
                "SELECT status, COUNT(*) AS n FROM feed_status GROUP BY status ORDER BY n DESC, status",
            )?,
            enrichment_tokens: enrichment_tokens as u64,
            enrichment_cost_usd,
            total_runs: self.count("SELECT COUNT(*) FROM runs")?,
        })
    }
}

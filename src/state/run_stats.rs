//! Progress and statistics aggregation
//!
//! `RunStats` is created once per run and shared by reference with the
//! pipelines. Every write happens in one short critical section; reads take a
//! snapshot under the same lock.

use super::{DomainState, FailureKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every unit of work reached a terminal outcome
    Completed,
    /// The cancel signal was raised
    Cancelled,
    /// Enrichment stopped submitting because the ceiling was reached
    BudgetExhausted,
    /// The run could not proceed (e.g. the store failed to open)
    Failed,
}

impl StopReason {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::BudgetExhausted => "budget_exhausted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "budget_exhausted" => Some(Self::BudgetExhausted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Point-in-time view of run progress
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub completed: u64,
    pub failed: u64,
    pub items_produced: u64,
    pub elapsed_ms: u64,
    /// Completed units per millisecond
    pub rate: f64,
    /// Estimated time until every remaining unit is done, if a rate is known
    pub eta_ms: Option<u64>,
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ok, {} failed, {} items, {:.1}/s",
            self.completed,
            self.failed,
            self.items_produced,
            self.rate * 1000.0
        )?;
        if let Some(eta) = self.eta_ms {
            write!(f, ", eta {}s", eta / 1000)?;
        }
        Ok(())
    }
}

/// Final report of a run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub tasks_total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub not_submitted: u64,
    pub items_produced: u64,
    pub total_cost_usd: f64,
    pub tokens_used: u64,
    pub duration_ms: u64,
    /// Domains with at least one successful fetch
    pub domains_covered: u64,
    pub failures_by_kind: HashMap<FailureKind, u64>,
    /// Per-domain tallies, sorted by domain name
    pub domains: Vec<(String, DomainState)>,
    pub stop_reason: StopReason,
}

impl RunSummary {
    /// Count of outcomes classified as `kind`
    pub fn failures_of(&self, kind: FailureKind) -> u64 {
        self.failures_by_kind.get(&kind).copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct StatsInner {
    tasks_total: u64,
    completed: u64,
    failed: u64,
    cancelled: u64,
    not_submitted: u64,
    items_produced: u64,
    total_cost_usd: f64,
    tokens_used: u64,
    failures_by_kind: HashMap<FailureKind, u64>,
    domains: HashMap<String, DomainState>,
}

impl StatsInner {
    fn terminal(&self) -> u64 {
        self.completed + self.failed + self.cancelled + self.not_submitted
    }

    fn sorted_domains(&self) -> Vec<(String, DomainState)> {
        let mut domains: Vec<_> = self
            .domains
            .iter()
            .map(|(d, s)| (d.clone(), s.clone()))
            .collect();
        domains.sort_by(|a, b| a.0.cmp(&b.0));
        domains
    }
}

/// Thread-safe run statistics shared by both pipelines
#[derive(Debug)]
pub struct RunStats {
    inner: Mutex<StatsInner>,
    started: Instant,
}

impl RunStats {
    /// Creates an aggregator expecting `tasks_total` units of work
    pub fn new(tasks_total: u64) -> Self {
        Self {
            inner: Mutex::new(StatsInner {
                tasks_total,
                ..StatsInner::default()
            }),
            started: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a successful unit of work
    ///
    /// Returns the number of terminal outcomes recorded so far.
    pub fn record_success(&self, domain: Option<&str>, items: u64) -> u64 {
        let mut inner = self.lock();
        inner.completed += 1;
        inner.items_produced += items;
        if let Some(domain) = domain {
            inner
                .domains
                .entry(domain.to_string())
                .or_default()
                .record_success(items);
        }
        inner.terminal()
    }

    /// Records a failed unit of work
    ///
    /// Returns the number of terminal outcomes recorded so far.
    pub fn record_failure(&self, domain: Option<&str>, kind: FailureKind) -> u64 {
        let mut inner = self.lock();
        inner.failed += 1;
        *inner.failures_by_kind.entry(kind).or_insert(0) += 1;
        if let Some(domain) = domain {
            inner
                .domains
                .entry(domain.to_string())
                .or_default()
                .record_failure();
        }
        inner.terminal()
    }

    /// Records a unit of work stopped by cancellation
    pub fn record_cancelled(&self) -> u64 {
        let mut inner = self.lock();
        inner.cancelled += 1;
        *inner
            .failures_by_kind
            .entry(FailureKind::Cancelled)
            .or_insert(0) += 1;
        inner.terminal()
    }

    /// Records units of work that were never submitted
    ///
    /// `reason` is `BudgetExceeded` or `Cancelled`.
    pub fn record_not_submitted(&self, count: u64, reason: FailureKind) -> u64 {
        let mut inner = self.lock();
        inner.not_submitted += count;
        if count > 0 {
            *inner.failures_by_kind.entry(reason).or_insert(0) += count;
        }
        inner.terminal()
    }

    /// Adds a settled enrichment cost
    pub fn record_cost(&self, cost_usd: f64, tokens: u64) {
        let mut inner = self.lock();
        inner.total_cost_usd += cost_usd;
        inner.tokens_used += tokens;
    }

    /// Returns a snapshot of current progress
    pub fn snapshot(&self) -> ProgressSnapshot {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let inner = self.lock();

        let rate = if elapsed_ms > 0 {
            inner.completed as f64 / elapsed_ms as f64
        } else {
            0.0
        };
        let remaining = inner.tasks_total.saturating_sub(inner.terminal());
        let eta_ms = if rate > 0.0 {
            Some((remaining as f64 / rate).round() as u64)
        } else {
            None
        };

        ProgressSnapshot {
            completed: inner.completed,
            failed: inner.failed,
            items_produced: inner.items_produced,
            elapsed_ms,
            rate,
            eta_ms,
        }
    }

    /// Returns the per-domain tallies, sorted by domain name
    pub fn domain_stats(&self) -> Vec<(String, DomainState)> {
        self.lock().sorted_domains()
    }

    /// Builds the final summary
    pub fn summary(&self, stop_reason: StopReason) -> RunSummary {
        let duration_ms = self.started.elapsed().as_millis() as u64;
        let inner = self.lock();

        RunSummary {
            tasks_total: inner.tasks_total,
            succeeded: inner.completed,
            failed: inner.failed,
            cancelled: inner.cancelled,
            not_submitted: inner.not_submitted,
            items_produced: inner.items_produced,
            total_cost_usd: inner.total_cost_usd,
            tokens_used: inner.tokens_used,
            duration_ms,
            domains_covered: inner.domains.values().filter(|d| d.is_covered()).count() as u64,
            failures_by_kind: inner.failures_by_kind.clone(),
            domains: inner.sorted_domains(),
            stop_reason,
        }
    }
}

//! Integration tests for the budget-bounded enrichment pipeline

use async_trait::async_trait;
use news_harvest::cancel::CancelSignal;
use news_harvest::enrich::{
    BudgetTracker, EnrichCapability, EnrichError, EnrichPipeline, EnrichSettings,
};
use news_harvest::model::{EnrichmentOutput, EnrichmentStatus, RawItem};
use news_harvest::retry::RetryPolicy;
use news_harvest::state::{FailureKind, RunStats, StopReason};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Charges a fixed amount per successful call
struct MeteredEnricher {
    cost: f64,
    latency: Duration,
    calls: AtomicU32,
    active: AtomicUsize,
    max_active: AtomicUsize,
    /// Failed attempts per item before it succeeds
    failures_before_success: u32,
    attempts: Mutex<HashMap<String, u32>>,
}

impl MeteredEnricher {
    fn new(cost: f64) -> Self {
        Self {
            cost,
            latency: Duration::from_millis(150),
            calls: AtomicU32::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            failures_before_success: 0,
            attempts: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl EnrichCapability for MeteredEnricher {
    async fn enrich(&self, item: &RawItem) -> Result<EnrichmentOutput, EnrichError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(item.url.clone()).or_insert(0);
            *n += 1;
            *n
        };

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if attempt <= self.failures_before_success {
            return Err(EnrichError::Status {
                status: 429,
                body: "rate limit reached".to_string(),
            });
        }
        Ok(EnrichmentOutput {
            outputs: json!({
                "language_level": "B2",
                "topics": ["Politik"],
                "vocabulary": [],
                "grammar_patterns": [],
                "difficulty_score": 5,
                "summary_de": "Kurzfassung"
            }),
            tokens_used: 1200,
            cost_usd: self.cost,
        })
    }

    fn estimate_cost(&self, _item: &RawItem) -> f64 {
        self.cost
    }
}

fn articles(n: usize) -> Vec<RawItem> {
    (0..n)
        .map(|i| RawItem {
            url: format!("https://www.tagesschau.de/inland/meldung-{}.html", i),
            title: format!("Meldung {}", i),
            published_at: None,
            source_domain: "www.tagesschau.de".to_string(),
            source_feed: "https://www.tagesschau.de/xml/rss2/".to_string(),
            theme: "news".to_string(),
            raw_content: "Der Bundestag hat am Donnerstag beraten.".repeat(5),
        })
        .collect()
}

fn settings(workers: usize) -> EnrichSettings {
    EnrichSettings {
        workers,
        retry: RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            jitter: Duration::ZERO,
        },
        min_dispatch_interval: Duration::ZERO,
        grace_period: Duration::from_secs(5),
        progress_interval: 25,
    }
}

#[tokio::test(start_paused = true)]
async fn test_budget_ceiling_splits_batch() {
    let enricher = Arc::new(MeteredEnricher::new(0.01));
    let budget = Arc::new(BudgetTracker::new(1.00));
    let pipeline = EnrichPipeline::new(
        enricher.clone(),
        budget.clone(),
        settings(5),
        CancelSignal::new(),
    );
    let stats = RunStats::new(200);

    let (results, report) = pipeline.enrich(articles(200), &stats).await;

    assert_eq!(results.len(), 200);
    let succeeded = results
        .iter()
        .filter(|r| r.status == EnrichmentStatus::Succeeded)
        .count();
    let not_submitted = results
        .iter()
        .filter(|r| r.status == EnrichmentStatus::NotSubmitted)
        .count();
    assert_eq!(succeeded, 100);
    assert_eq!(not_submitted, 100);
    assert!(report.budget_exhausted);
    assert_eq!(enricher.calls.load(Ordering::SeqCst), 100);

    assert!(budget.spent_usd() <= 1.00 + 1e-9);
    assert!(budget.is_exhausted());

    let summary = stats.summary(StopReason::BudgetExhausted);
    assert_eq!(summary.succeeded, 100);
    assert_eq!(summary.not_submitted, 100);
    assert_eq!(summary.failures_of(FailureKind::BudgetExceeded), 100);
    assert!((summary.total_cost_usd - 1.00).abs() < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn test_reservations_never_exceed_ceiling_under_concurrency() {
    let enricher = Arc::new(MeteredEnricher::new(0.07));
    let budget = Arc::new(BudgetTracker::new(1.00));
    let pipeline = EnrichPipeline::new(
        enricher.clone(),
        budget.clone(),
        settings(8),
        CancelSignal::new(),
    );
    let stats = RunStats::new(50);

    let (results, report) = pipeline.enrich(articles(50), &stats).await;

    // floor(1.00 / 0.07) = 14
    assert_eq!(report.dispatched, 14);
    assert_eq!(results.len(), 50);
    assert!(enricher.max_active.load(Ordering::SeqCst) <= 8);
    assert!(budget.spent_usd() <= 1.00);
    assert!(budget.reserved_usd().abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_retries_share_one_reservation() {
    let mut enricher = MeteredEnricher::new(0.25);
    enricher.failures_before_success = 2;
    let enricher = Arc::new(enricher);
    let budget = Arc::new(BudgetTracker::new(1.00));
    let pipeline = EnrichPipeline::new(
        enricher.clone(),
        budget.clone(),
        settings(2),
        CancelSignal::new(),
    );
    let stats = RunStats::new(4);

    let (results, report) = pipeline.enrich(articles(4), &stats).await;

    assert_eq!(report.dispatched, 4);
    assert!(!report.budget_exhausted);
    assert!(results.iter().all(|r| r.success()));
    assert!(results.iter().all(|r| r.job.attempt_count == 3));
    assert_eq!(enricher.calls.load(Ordering::SeqCst), 12);

    // Each job was charged once despite three attempts
    assert!((budget.spent_usd() - 1.00).abs() < 1e-9);
    assert!((stats.summary(StopReason::Completed).total_cost_usd - 1.00).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_leaves_remaining_items_unsubmitted() {
    let enricher = Arc::new(MeteredEnricher::new(0.01));
    let cancel = CancelSignal::new();
    let pipeline = EnrichPipeline::new(
        enricher.clone(),
        Arc::new(BudgetTracker::new(10.0)),
        settings(2),
        cancel.clone(),
    );
    let stats = RunStats::new(40);

    let mut results = Vec::new();
    let report = pipeline
        .enrich_with(articles(40), &stats, |result| {
            results.push(result);
            if results.len() == 10 {
                cancel.cancel();
            }
        })
        .await;

    assert_eq!(results.len(), 40, "one result per input item");
    assert!(report.not_submitted > 0);
    assert_eq!(report.dispatched + report.not_submitted, 40);
    assert!(!report.budget_exhausted);
    assert_eq!(
        enricher.calls.load(Ordering::SeqCst) as usize,
        results.iter().filter(|r| r.success()).count()
    );
    assert!(results.iter().all(|r| matches!(
        r.status,
        EnrichmentStatus::Succeeded | EnrichmentStatus::Cancelled
    )));

    let summary = stats.summary(StopReason::Cancelled);
    assert_eq!(summary.not_submitted, report.not_submitted as u64);
    assert_eq!(
        summary.succeeded + summary.failed + summary.cancelled + summary.not_submitted,
        40
    );
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_interval_spaces_requests() {
    let enricher = Arc::new(MeteredEnricher::new(0.01));
    let mut settings = settings(4);
    settings.min_dispatch_interval = Duration::from_millis(500);
    let pipeline = EnrichPipeline::new(
        enricher,
        Arc::new(BudgetTracker::new(5.0)),
        settings,
        CancelSignal::new(),
    );
    let stats = RunStats::new(10);

    let started = tokio::time::Instant::now();
    let (results, _) = pipeline.enrich(articles(10), &stats).await;

    assert_eq!(results.len(), 10);
    // Ten requests need at least nine intervals between them
    assert!(started.elapsed() >= Duration::from_millis(4500));
}

/// Accepts the request and never answers
struct StalledEnricher {
    calls: AtomicU32,
}

#[async_trait]
impl EnrichCapability for StalledEnricher {
    async fn enrich(&self, _item: &RawItem) -> Result<EnrichmentOutput, EnrichError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(EnrichError::new(FailureKind::TransientNetwork, "stalled"))
    }

    fn estimate_cost(&self, _item: &RawItem) -> f64 {
        0.05
    }
}

#[tokio::test(start_paused = true)]
async fn test_grace_period_aborts_stuck_jobs() {
    let enricher = Arc::new(StalledEnricher {
        calls: AtomicU32::new(0),
    });
    let budget = Arc::new(BudgetTracker::new(10.0));
    let cancel = CancelSignal::new();
    let pipeline = EnrichPipeline::new(
        enricher.clone(),
        budget.clone(),
        settings(3),
        cancel.clone(),
    );
    let stats = RunStats::new(10);

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let started = tokio::time::Instant::now();
    let (results, report) = pipeline.enrich(articles(10), &stats).await;

    // One second of work plus the five second grace period
    assert!(started.elapsed() >= Duration::from_secs(6));
    assert!(started.elapsed() < Duration::from_secs(7));
    assert_eq!(report.dispatched, 3);
    assert_eq!(report.aborted, 3);
    assert_eq!(report.not_submitted, 7);
    assert_eq!(enricher.calls.load(Ordering::SeqCst), 3);

    assert_eq!(results.len(), 10);
    assert!(results
        .iter()
        .all(|r| r.status == EnrichmentStatus::Cancelled));

    // Aborted jobs may still be billed, so their estimates stay committed
    assert!((budget.reserved_usd() - 0.15).abs() < 1e-9);
    assert_eq!(budget.spent_usd(), 0.0);
    assert!(!budget.is_exhausted());

    let summary = stats.summary(StopReason::Cancelled);
    assert_eq!(summary.cancelled, 3);
    assert_eq!(summary.not_submitted, 7);
    assert_eq!(summary.succeeded + summary.failed, 0);
}

/// Answers without ever yielding
struct InstantEnricher;

#[async_trait]
impl EnrichCapability for InstantEnricher {
    async fn enrich(&self, _item: &RawItem) -> Result<EnrichmentOutput, EnrichError> {
        Ok(EnrichmentOutput {
            outputs: json!({
                "language_level": "B1",
                "topics": ["Wirtschaft"],
                "vocabulary": [],
                "grammar_patterns": []
            }),
            tokens_used: 800,
            cost_usd: 0.01,
        })
    }

    fn estimate_cost(&self, _item: &RawItem) -> f64 {
        0.01
    }
}

#[tokio::test(start_paused = true)]
async fn test_finished_jobs_survive_grace_expiry() {
    let budget = Arc::new(BudgetTracker::new(1.0));
    let cancel = CancelSignal::new();
    let mut settings = settings(20);
    settings.grace_period = Duration::ZERO;
    let pipeline = EnrichPipeline::new(
        Arc::new(InstantEnricher),
        budget.clone(),
        settings,
        cancel.clone(),
    );
    let stats = RunStats::new(20);

    let mut results = Vec::new();
    let report = pipeline
        .enrich_with(articles(20), &stats, |result| {
            results.push(result);
            cancel.cancel();
        })
        .await;

    // Every job was billed before the cancel, so every result is kept
    assert_eq!(report.dispatched, 20);
    assert_eq!(report.aborted, 0);
    assert_eq!(results.len(), 20);
    assert!(results.iter().all(|r| r.success()));
    assert!((budget.spent_usd() - 0.20).abs() < 1e-9);
    assert_eq!(budget.reserved_usd(), 0.0);
}

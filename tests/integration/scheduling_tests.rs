//! Integration tests for the fetch scheduler
//!
//! These tests drive the scheduler with an in-memory fetch capability under
//! paused tokio time, so simulated latencies cost nothing in wall-clock time.

use async_trait::async_trait;
use news_harvest::cancel::CancelSignal;
use news_harvest::fetch::{
    round_robin_by_domain, FetchCapability, FetchError, FetchScheduler, SchedulerSettings,
};
use news_harvest::model::{FeedDescriptor, RawItem, TaskOutcome};
use news_harvest::retry::RetryPolicy;
use news_harvest::state::{FailureKind, RunStats, StopReason};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory feed source that records how many fetches overlap
struct SimulatedFetcher {
    rng: Mutex<StdRng>,
    min_latency_ms: u64,
    max_latency_ms: u64,
    /// Probability that a single attempt fails with a transient error
    transient_rate: f64,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    active_per_domain: Mutex<HashMap<String, usize>>,
    max_per_domain: AtomicUsize,
}

impl SimulatedFetcher {
    fn new(seed: u64, latency_ms: (u64, u64), transient_rate: f64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            min_latency_ms: latency_ms.0,
            max_latency_ms: latency_ms.1,
            transient_rate,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            active_per_domain: Mutex::new(HashMap::new()),
            max_per_domain: AtomicUsize::new(0),
        }
    }

    fn enter(&self, domain: &str) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let mut per_domain = self.active_per_domain.lock().unwrap();
        let count = per_domain.entry(domain.to_string()).or_insert(0);
        *count += 1;
        self.max_per_domain.fetch_max(*count, Ordering::SeqCst);
    }

    fn leave(&self, domain: &str) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        let mut per_domain = self.active_per_domain.lock().unwrap();
        if let Some(count) = per_domain.get_mut(domain) {
            *count -= 1;
        }
    }
}

#[async_trait]
impl FetchCapability for SimulatedFetcher {
    async fn fetch_body(
        &self,
        descriptor: &FeedDescriptor,
        _timeout: Duration,
    ) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (latency, fails) = {
            let mut rng = self.rng.lock().unwrap();
            (
                rng.random_range(self.min_latency_ms..=self.max_latency_ms),
                rng.random_bool(self.transient_rate),
            )
        };

        self.enter(&descriptor.domain);
        tokio::time::sleep(Duration::from_millis(latency)).await;
        self.leave(&descriptor.domain);

        if fails {
            return Err(FetchError::new(
                FailureKind::TransientNetwork,
                "connection reset by peer",
            ));
        }
        Ok("<rss/>".to_string())
    }

    async fn extract(
        &self,
        descriptor: &FeedDescriptor,
        _body: String,
    ) -> Result<Vec<RawItem>, FetchError> {
        Ok(vec![item_for(descriptor)])
    }
}

fn item_for(descriptor: &FeedDescriptor) -> RawItem {
    RawItem {
        url: format!("{}/artikel", descriptor.url),
        title: "Schlagzeile".to_string(),
        published_at: None,
        source_domain: descriptor.domain.clone(),
        source_feed: descriptor.url.clone(),
        theme: descriptor.theme.clone(),
        raw_content: "Ein kurzer Artikeltext.".to_string(),
    }
}

/// `total` feeds spread as evenly as possible over `domains` domains
fn catalog(total: usize, domains: usize) -> Vec<FeedDescriptor> {
    (0..total)
        .map(|i| {
            let domain = format!("quelle{}.de", i % domains);
            FeedDescriptor::new(format!("https://{}/feed/{}", domain, i), domain, "news")
        })
        .collect()
}

fn settings(global: usize, per_domain: usize) -> SchedulerSettings {
    SchedulerSettings {
        global_concurrency: global,
        per_domain_concurrency: per_domain,
        per_domain_delay: Duration::ZERO,
        retry: RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            jitter: Duration::from_millis(50),
        },
        fetch_timeout: Duration::from_secs(10),
        grace_period: Duration::from_secs(5),
        progress_interval: 100,
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_catalog_run() {
    let fetcher = Arc::new(SimulatedFetcher::new(7, (50, 200), 0.02));
    let scheduler = FetchScheduler::new(fetcher.clone(), settings(15, 3), CancelSignal::new());
    let ordered = round_robin_by_domain(&catalog(698, 12));
    let stats = RunStats::new(698);

    let (results, report) = scheduler.schedule(ordered, &stats).await;
    let summary = stats.summary(StopReason::Completed);

    assert_eq!(results.len(), 698);
    assert_eq!(report.dispatched, 698);
    assert_eq!(report.not_submitted, 0);
    assert_eq!(summary.succeeded + summary.failed, 698);
    assert!(
        (summary.failed as f64) / 698.0 < 0.005,
        "too many failures: {}",
        summary.failed
    );
    assert_eq!(summary.domains_covered, 12);

    let unique: HashSet<&str> = results
        .iter()
        .map(|r| r.task.descriptor.url.as_str())
        .collect();
    assert_eq!(unique.len(), 698, "each task reported exactly once");
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_caps_are_respected() {
    let fetcher = Arc::new(SimulatedFetcher::new(11, (50, 200), 0.0));
    let scheduler = FetchScheduler::new(fetcher.clone(), settings(15, 3), CancelSignal::new());

    // Two large domains would saturate the pool without the per-domain cap
    let mut feeds = catalog(60, 2);
    feeds.extend(catalog(30, 10).into_iter().map(|mut f| {
        f.domain = format!("klein-{}", f.domain);
        f
    }));
    let stats = RunStats::new(feeds.len() as u64);

    let (results, _) = scheduler.schedule(feeds, &stats).await;

    assert_eq!(results.len(), 90);
    assert!(fetcher.max_active.load(Ordering::SeqCst) <= 15);
    assert!(fetcher.max_per_domain.load(Ordering::SeqCst) <= 3);
    assert!(
        fetcher.max_active.load(Ordering::SeqCst) > 3,
        "different domains should overlap"
    );
}

/// Fails a fixed number of times per feed, keyed by the feed path
struct ScriptedFetcher {
    attempts: Mutex<HashMap<String, u32>>,
}

#[async_trait]
impl FetchCapability for ScriptedFetcher {
    async fn fetch_body(
        &self,
        descriptor: &FeedDescriptor,
        _timeout: Duration,
    ) -> Result<String, FetchError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(descriptor.url.clone()).or_insert(0);
            *n += 1;
            *n
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        if descriptor.url.ends_with("/flaky") && attempt <= 2 {
            return Err(FetchError::new(FailureKind::TransientNetwork, "HTTP 503"));
        }
        if descriptor.url.ends_with("/down") {
            return Err(FetchError::new(FailureKind::TransientNetwork, "HTTP 502"));
        }
        if descriptor.url.ends_with("/gone") {
            return Err(FetchError::new(FailureKind::Client, "HTTP 404"));
        }
        if descriptor.url.ends_with("/garbage") {
            return Ok("<html>kein Feed</html>".to_string());
        }
        Ok("<rss/>".to_string())
    }

    async fn extract(
        &self,
        descriptor: &FeedDescriptor,
        body: String,
    ) -> Result<Vec<RawItem>, FetchError> {
        if body.starts_with("<html>") {
            return Err(FetchError::new(FailureKind::Extraction, "not a feed"));
        }
        Ok(vec![item_for(descriptor)])
    }
}

#[tokio::test(start_paused = true)]
async fn test_retry_only_transient_failures() {
    let fetcher = Arc::new(ScriptedFetcher {
        attempts: Mutex::new(HashMap::new()),
    });
    let scheduler = FetchScheduler::new(fetcher.clone(), settings(4, 2), CancelSignal::new());
    let feeds: Vec<_> = ["flaky", "down", "gone", "garbage", "ok"]
        .iter()
        .map(|name| {
            FeedDescriptor::new(format!("https://www.spiegel.de/{}", name), "www.spiegel.de", "news")
        })
        .collect();
    let stats = RunStats::new(5);

    let (results, _) = scheduler.schedule(feeds, &stats).await;
    let by_name: HashMap<&str, _> = results
        .iter()
        .map(|r| (r.task.descriptor.url.rsplit('/').next().unwrap(), r))
        .collect();

    let flaky = by_name["flaky"];
    assert_eq!(flaky.outcome, TaskOutcome::Succeeded);
    assert_eq!(flaky.task.attempt_count, 3);

    let down = by_name["down"];
    assert_eq!(down.outcome, TaskOutcome::Failed);
    assert_eq!(down.error, Some(FailureKind::TransientNetwork));
    assert_eq!(down.task.attempt_count, 3);

    let gone = by_name["gone"];
    assert_eq!(gone.error, Some(FailureKind::Client));
    assert_eq!(gone.task.attempt_count, 1);

    let garbage = by_name["garbage"];
    assert_eq!(garbage.error, Some(FailureKind::Extraction));
    assert_eq!(garbage.task.attempt_count, 1);

    assert_eq!(by_name["ok"].task.attempt_count, 1);

    let summary = stats.summary(StopReason::Completed);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 3);
    assert_eq!(summary.failures_of(FailureKind::TransientNetwork), 1);
    assert_eq!(summary.failures_of(FailureKind::Client), 1);
    assert_eq!(summary.failures_of(FailureKind::Extraction), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_midway_stops_submission() {
    let fetcher = Arc::new(SimulatedFetcher::new(3, (100, 100), 0.0));
    let cancel = CancelSignal::new();
    let scheduler = FetchScheduler::new(fetcher.clone(), settings(4, 2), cancel.clone());
    let ordered = round_robin_by_domain(&catalog(100, 5));
    let stats = RunStats::new(100);

    let mut results = Vec::new();
    let report = scheduler
        .schedule_with(ordered, &stats, |result| {
            results.push(result);
            if results.len() == 50 {
                cancel.cancel();
            }
        })
        .await;

    assert!(report.not_submitted > 0);
    assert!(report.dispatched < 60, "dispatched {}", report.dispatched);
    assert_eq!(report.dispatched + report.not_submitted, 100);
    assert_eq!(results.len(), report.dispatched);
    assert!(fetcher.calls.load(Ordering::SeqCst) <= report.dispatched);

    // In-flight fetches drained well within the grace period
    assert_eq!(report.aborted, 0);
    assert!(results
        .iter()
        .all(|r| matches!(r.outcome, TaskOutcome::Succeeded | TaskOutcome::Cancelled)));

    let summary = stats.summary(StopReason::Cancelled);
    assert_eq!(
        summary.succeeded + summary.failed + summary.cancelled + summary.not_submitted,
        100
    );
    assert_eq!(
        summary.failures_of(FailureKind::Cancelled),
        report.not_submitted as u64 + summary.cancelled
    );
}

/// Never answers
struct StalledFetcher;

#[async_trait]
impl FetchCapability for StalledFetcher {
    async fn fetch_body(
        &self,
        _descriptor: &FeedDescriptor,
        _timeout: Duration,
    ) -> Result<String, FetchError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(FetchError::new(FailureKind::TransientNetwork, "stalled"))
    }

    async fn extract(
        &self,
        _descriptor: &FeedDescriptor,
        _body: String,
    ) -> Result<Vec<RawItem>, FetchError> {
        Ok(Vec::new())
    }
}

#[tokio::test(start_paused = true)]
async fn test_grace_period_aborts_stuck_fetches() {
    let cancel = CancelSignal::new();
    let mut settings = settings(3, 3);
    settings.fetch_timeout = Duration::from_secs(7200);
    let scheduler = FetchScheduler::new(Arc::new(StalledFetcher), settings, cancel.clone());
    let stats = RunStats::new(10);

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let started = tokio::time::Instant::now();
    let (results, report) = scheduler.schedule(catalog(10, 5), &stats).await;

    assert_eq!(report.dispatched, 3);
    assert_eq!(report.aborted, 3);
    assert_eq!(report.not_submitted, 7);
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.outcome == TaskOutcome::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(60));

    let summary = stats.summary(StopReason::Cancelled);
    assert_eq!(summary.cancelled, 3);
    assert_eq!(summary.not_submitted, 7);
}

#[tokio::test(start_paused = true)]
async fn test_round_robin_results_cover_domains_first() {
    let fetcher = Arc::new(SimulatedFetcher::new(5, (50, 50), 0.0));
    // One worker, so completions follow dispatch order
    let scheduler = FetchScheduler::new(fetcher, settings(1, 1), CancelSignal::new());

    // Uneven domain sizes, listed domain by domain
    let mut feeds = Vec::new();
    for (d, size) in [12usize, 1, 5, 3, 8, 2].iter().enumerate() {
        let domain = format!("portal{}.de", d);
        for i in 0..*size {
            feeds.push(FeedDescriptor::new(
                format!("https://{}/rss/{}", domain, i),
                domain.clone(),
                "news",
            ));
        }
    }
    let stats = RunStats::new(feeds.len() as u64);

    let (results, _) = scheduler
        .schedule(round_robin_by_domain(&feeds), &stats)
        .await;

    let first: HashSet<&str> = results
        .iter()
        .take(6)
        .map(|r| r.domain())
        .collect();
    assert_eq!(first.len(), 6);
}

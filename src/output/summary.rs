//! Run summaries and the dry-run fetch plan

use crate::model::FeedDescriptor;
use crate::state::{FailureKind, RunSummary};
use crate::storage::RunKind;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Renders the final summary of a run
pub fn format_summary(kind: RunKind, summary: &RunSummary) -> String {
    let mut out = String::new();
    let title = match kind {
        RunKind::Fetch => "Fetch",
        RunKind::Enrich => "Enrichment",
    };

    let _ = writeln!(out, "=== {} Run Summary ===\n", title);
    let _ = writeln!(out, "Stop reason: {}", summary.stop_reason);
    let _ = writeln!(out, "Duration: {:.1}s", summary.duration_ms as f64 / 1000.0);
    let _ = writeln!(out, "Tasks: {}", summary.tasks_total);
    let _ = writeln!(out, "  Succeeded: {}", summary.succeeded);
    let _ = writeln!(out, "  Failed: {}", summary.failed);
    let _ = writeln!(out, "  Cancelled: {}", summary.cancelled);
    let _ = writeln!(out, "  Not submitted: {}", summary.not_submitted);

    match kind {
        RunKind::Fetch => {
            let _ = writeln!(out, "Items produced: {}", summary.items_produced);
            let _ = writeln!(out, "Domains covered: {}", summary.domains_covered);
        }
        RunKind::Enrich => {
            let _ = writeln!(out, "Tokens used: {}", summary.tokens_used);
            let _ = writeln!(out, "Total cost: ${:.4}", summary.total_cost_usd);
        }
    }

    if kind == RunKind::Fetch && !summary.domains.is_empty() {
        let _ = writeln!(out, "\nDomain statistics:");
        for (domain, state) in &summary.domains {
            let _ = writeln!(
                out,
                "  {}: {} feeds, {} items, {} errors",
                domain, state.processed, state.items, state.errors
            );
        }
    }

    let failures: Vec<(FailureKind, u64)> = FailureKind::all()
        .into_iter()
        .map(|kind| (kind, summary.failures_of(kind)))
        .filter(|(_, count)| *count > 0)
        .collect();
    if !failures.is_empty() {
        let _ = writeln!(out, "\nFailures by kind:");
        for (kind, count) in failures {
            let _ = writeln!(out, "  {}: {}", kind, count);
        }
    }

    out
}

/// Prints the final summary of a run to stdout
pub fn print_summary(kind: RunKind, summary: &RunSummary) {
    print!("{}", format_summary(kind, summary));
}

/// Renders the dispatch order of a fetch run
pub fn format_fetch_plan(ordered: &[FeedDescriptor]) -> String {
    let mut out = String::new();
    let mut per_domain: BTreeMap<&str, usize> = BTreeMap::new();
    for feed in ordered {
        *per_domain.entry(feed.domain.as_str()).or_insert(0) += 1;
    }

    let _ = writeln!(
        out,
        "=== Fetch Plan: {} feeds across {} domains ===\n",
        ordered.len(),
        per_domain.len()
    );
    for (i, feed) in ordered.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>4}. [{}] {} (priority {}, {})",
            i + 1,
            feed.domain,
            feed.url,
            feed.priority,
            feed.strategy
        );
    }
    let _ = writeln!(out, "\nFeeds per domain:");
    for (domain, count) in per_domain {
        let _ = writeln!(out, "  {}: {}", domain, count);
    }

    out
}

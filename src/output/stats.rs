//! Statistics report from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! database statistics from the storage layer.

use crate::storage::{RunRecord, Storage, StoreStatistics};
use crate::HarvestError;
use std::fmt::Write;

/// Database statistics plus the most recent run
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    pub store: StoreStatistics,
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<HarvestStatistics, HarvestError> {
    Ok(HarvestStatistics {
        store: storage.statistics()?,
        latest_run: storage.get_latest_run()?,
    })
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64 * 100.0
    } else {
        0.0
    }
}

/// Renders the statistics report
pub fn format_statistics(stats: &HarvestStatistics) -> String {
    let store = &stats.store;
    let mut out = String::new();

    let _ = writeln!(out, "=== Harvest Statistics ===\n");
    let _ = writeln!(out, "Overview:");
    let _ = writeln!(out, "  Articles stored: {}", store.total_articles);
    let _ = writeln!(
        out,
        "  Articles enriched: {} ({:.1}%)",
        store.enriched_articles,
        percentage(store.enriched_articles, store.total_articles)
    );
    let _ = writeln!(out, "  Source domains: {}", store.articles_by_domain.len());
    let _ = writeln!(out, "  Runs recorded: {}", store.total_runs);
    let _ = writeln!(out);

    if !store.articles_by_domain.is_empty() {
        let _ = writeln!(out, "Articles by Domain:");
        for (domain, count) in &store.articles_by_domain {
            let _ = writeln!(
                out,
                "  {}: {} ({:.1}%)",
                domain,
                count,
                percentage(*count, store.total_articles)
            );
        }
        let _ = writeln!(out);
    }

    if !store.articles_by_theme.is_empty() {
        let _ = writeln!(out, "Articles by Theme:");
        for (theme, count) in &store.articles_by_theme {
            let _ = writeln!(out, "  {}: {}", theme, count);
        }
        let _ = writeln!(out);
    }

    if !store.feeds_by_status.is_empty() {
        let _ = writeln!(out, "Feeds by Last Status:");
        for (status, count) in &store.feeds_by_status {
            let _ = writeln!(out, "  {}: {}", status, count);
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "Enrichment:");
    let _ = writeln!(out, "  Tokens used: {}", store.enrichment_tokens);
    let _ = writeln!(out, "  Total cost: ${:.4}", store.enrichment_cost_usd);
    if store.enriched_articles > 0 {
        let _ = writeln!(
            out,
            "  Average cost per article: ${:.6}",
            store.enrichment_cost_usd / store.enriched_articles as f64
        );
    }

    if let Some(run) = &stats.latest_run {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Latest Run: #{} ({}, {}) started {}",
            run.id, run.kind, run.status, run.started_at
        );
        let _ = writeln!(
            out,
            "  {} succeeded, {} failed, {} cancelled, {} not submitted of {}",
            run.succeeded, run.failed, run.cancelled, run.not_submitted, run.tasks_total
        );
    }

    out
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    print!("{}", format_statistics(stats));
}

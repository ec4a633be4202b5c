//! news-harvest main entry point
//!
//! This is the command-line interface for the news-harvest fetcher and enricher.

use clap::Parser;
use news_harvest::cancel::CancelSignal;
use news_harvest::config::{load_config_with_hash, Config};
use news_harvest::enrich::{EnrichCoordinator, EnrichOptions};
use news_harvest::fetch::{order_feeds, stratified_sample, FetchCoordinator};
use news_harvest::output::{format_fetch_plan, load_statistics, print_statistics, print_summary};
use news_harvest::storage::{open_storage, RunKind};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// news-harvest: a diversity-first news fetcher
///
/// news-harvest fetches RSS and Atom feeds from many sources, interleaving
/// them by domain, and enriches the stored articles through an AI API
/// without spending past a configured budget.
#[derive(Parser, Debug)]
#[command(name = "news-harvest")]
#[command(version)]
#[command(about = "A diversity-first news fetcher with budget-bounded enrichment", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the fetch order without fetching
    #[arg(long, conflicts_with_all = ["stats", "enrich"])]
    dry_run: bool,

    /// With --dry-run, show only the first N feeds of each domain
    #[arg(long, value_name = "N", requires = "dry_run")]
    sample: Option<usize>,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "enrich"])]
    stats: bool,

    /// Enrich stored articles instead of fetching
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    enrich: bool,

    /// With --enrich, process at most N articles
    #[arg(long, value_name = "N", requires = "enrich")]
    limit: Option<usize>,

    /// With --enrich, override the budget ceiling in USD
    #[arg(long, value_name = "USD", requires = "enrich")]
    max_cost: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    // The API key may live in a .env file next to the config
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config, cli.sample)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.enrich {
        let options = EnrichOptions {
            limit: cli.limit,
            max_cost_usd: cli.max_cost,
        };
        handle_enrich(config, &config_hash, options).await?;
    } else {
        handle_fetch(config, &config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("news_harvest=info,warn"),
            1 => EnvFilter::new("news_harvest=debug,info"),
            2 => EnvFilter::new("news_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Raises `cancel` on the first Ctrl-C
fn cancel_on_ctrl_c() -> CancelSignal {
    let cancel = CancelSignal::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("Interrupt received, stopping new submissions");
                signal.cancel();
            }
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
    });
    cancel
}

/// Handles the --dry-run mode: validates config and shows the fetch order
fn handle_dry_run(config: &Config, sample: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== news-harvest Dry Run ===\n");

    println!("Scheduler:");
    println!(
        "  Concurrency: {} global, {} per domain",
        config.scheduler.global_concurrency, config.scheduler.per_domain_concurrency
    );
    println!(
        "  Per-domain delay: {}ms",
        config.scheduler.per_domain_delay_ms
    );
    println!("  Ordering: {}", config.scheduler.ordering);
    println!(
        "  Retries: {} (base {}ms, cap {}ms)",
        config.scheduler.max_retries, config.scheduler.base_delay_ms, config.scheduler.max_delay_ms
    );

    println!("\nEnrichment:");
    println!("  Workers: {}", config.enrichment.workers);
    println!("  Budget ceiling: ${:.2}", config.enrichment.budget_ceiling_usd);
    println!("  Model: {}", config.ai.model);

    println!("\nUser Agent: {}", config.user_agent.user_agent());
    println!("Database: {}\n", config.output.database_path);

    let descriptors = config.feed_descriptors()?;
    let ordered = order_feeds(config.scheduler.ordering, &descriptors);
    let plan = match sample {
        Some(per_domain) => stratified_sample(&ordered, per_domain),
        None => ordered,
    };
    print!("{}", format_fetch_plan(&plan));

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --enrich mode
async fn handle_enrich(
    config: Config,
    config_hash: &str,
    options: EnrichOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = cancel_on_ctrl_c();
    let mut coordinator = EnrichCoordinator::new(config, config_hash, cancel)?;

    match coordinator.run(options).await {
        Ok(summary) => {
            print_summary(RunKind::Enrich, &summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Enrichment failed: {}", e);
            Err(e.into())
        }
    }
}

/// Handles the main fetch operation
async fn handle_fetch(config: Config, config_hash: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        "Feeds: {}, ordering: {}",
        config.feeds.len(),
        config.scheduler.ordering
    );

    let cancel = cancel_on_ctrl_c();
    let mut coordinator = FetchCoordinator::new(config, config_hash, cancel)?;

    match coordinator.run().await {
        Ok(summary) => {
            print_summary(RunKind::Fetch, &summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Fetch run failed: {}", e);
            Err(e.into())
        }
    }
}

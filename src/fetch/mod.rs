//! Fetch pipeline
//!
//! This module turns the configured feed catalog into stored articles:
//! - Ordering the catalog so consecutive dispatches hit different domains
//! - Bounded-parallelism scheduling with global and per-domain limits
//! - Fetching and parsing RSS/Atom feeds over HTTP
//! - Persisting each result as it completes

mod coordinator;
mod fetcher;
mod limiter;
mod ordering;
mod parser;
mod scheduler;

pub use coordinator::FetchCoordinator;
pub use fetcher::{
    build_http_client, entries_to_items, select_entries, FetchCapability, FetchError,
    HttpFeedFetcher,
};
pub use limiter::DomainLimiter;
pub use ordering::{
    hybrid_priority_round_robin, order_feeds, priority_sort, round_robin_by_domain, shuffle,
    stratified_sample, OrderingStrategy,
};
pub use parser::{html_to_text, parse_date, parse_feed, FeedParseError, ParsedEntry};
pub use scheduler::{FetchScheduler, ScheduleReport, SchedulerSettings};

//! Data model shared by the fetch and enrichment pipelines
//!
//! - `FeedDescriptor`: one catalog entry, immutable for the run
//! - `RawItem`: an article extracted from a feed, keyed by its URL
//! - `FetchTask` / `FetchResult`: a unit of fetch work and its terminal outcome
//! - `EnrichmentJob` / `EnrichmentResult`: a unit of enrichment work and its outcome

mod feed;
mod item;
mod task;

pub use feed::{FeedDescriptor, FetchStrategy};
pub use item::RawItem;
pub use task::{
    EnrichmentJob, EnrichmentOutput, EnrichmentResult, EnrichmentStatus, FetchResult, FetchTask,
    TaskOutcome,
};

//! Enrichment pipeline
//!
//! Runs stored articles through a metered AI API without spending past a
//! configured ceiling. See [`EnrichPipeline`] for the reservation rules.

mod budget;
mod client;
mod coordinator;
mod pipeline;

pub use budget::{BudgetExceeded, BudgetTracker, Reservation};
pub use client::{
    build_prompt, parse_analysis, ChatCompletionEnricher, EnrichCapability, EnrichError,
};
pub use coordinator::{EnrichCoordinator, EnrichOptions};
pub use pipeline::{EnrichPipeline, EnrichReport, EnrichSettings};

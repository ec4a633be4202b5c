//! Output module for run summaries and reports
//!
//! This module handles:
//! - Printing the final summary of a fetch or enrichment run
//! - Printing the dry-run fetch plan
//! - Reporting database statistics

pub mod stats;
mod summary;

pub use stats::{format_statistics, load_statistics, print_statistics, HarvestStatistics};
pub use summary::{format_fetch_plan, format_summary, print_summary};

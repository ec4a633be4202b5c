//! State module for tracking run progress
//!
//! # Components
//!
//! - `FailureKind`: the failure taxonomy shared by fetch and enrichment
//! - `JobState`: lifecycle of an enrichment job and its legal transitions
//! - `DomainState`: per-domain outcome tallies
//! - `RunStats`: the synchronized aggregator producing snapshots and the run summary

mod domain_state;
mod job_state;
mod run_stats;
mod task_state;

// Re-export main types
pub use domain_state::DomainState;
pub use job_state::JobState;
pub use run_stats::{ProgressSnapshot, RunStats, RunSummary, StopReason};
pub use task_state::FailureKind;

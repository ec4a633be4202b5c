use super::{FeedDescriptor, RawItem};
use crate::state::FailureKind;
use std::fmt;

/// A unit of fetch work
///
/// Created when the scheduler dequeues a descriptor; the attempt count is
/// advanced by the retry coordinator.
#[derive(Debug, Clone)]
pub struct FetchTask {
    pub descriptor: FeedDescriptor,
    pub attempt_count: u32,
}

impl FetchTask {
    pub fn new(descriptor: FeedDescriptor) -> Self {
        Self {
            descriptor,
            attempt_count: 0,
        }
    }
}

/// Terminal outcome of a task or job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Result of one fetch task, emitted exactly once per dispatched task
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub task: FetchTask,
    pub outcome: TaskOutcome,
    pub items: Vec<RawItem>,
    pub error: Option<FailureKind>,
    /// Human-readable detail of the last error, if any
    pub message: Option<String>,
}

impl FetchResult {
    pub fn succeeded(task: FetchTask, items: Vec<RawItem>) -> Self {
        Self {
            task,
            outcome: TaskOutcome::Succeeded,
            items,
            error: None,
            message: None,
        }
    }

    pub fn failed(task: FetchTask, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            task,
            outcome: TaskOutcome::Failed,
            items: Vec::new(),
            error: Some(kind),
            message: Some(message.into()),
        }
    }

    pub fn cancelled(task: FetchTask) -> Self {
        Self {
            task,
            outcome: TaskOutcome::Cancelled,
            items: Vec::new(),
            error: Some(FailureKind::Cancelled),
            message: None,
        }
    }

    pub fn success(&self) -> bool {
        self.outcome == TaskOutcome::Succeeded
    }

    pub fn domain(&self) -> &str {
        &self.task.descriptor.domain
    }
}

/// A unit of enrichment work for one stored item
#[derive(Debug, Clone)]
pub struct EnrichmentJob {
    /// Natural key of the item being enriched
    pub item_key: String,
    pub estimated_cost_usd: f64,
    pub attempt_count: u32,
}

/// What the enrichment capability returns for one item
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentOutput {
    pub outputs: serde_json::Value,
    pub tokens_used: u64,
    pub cost_usd: f64,
}

/// Terminal status of an enrichment job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnrichmentStatus {
    Succeeded,
    Failed,
    /// The budget ran out before the job could be submitted
    NotSubmitted,
    Cancelled,
}

impl fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::NotSubmitted => "not_submitted",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Result of one enrichment job, emitted exactly once per input item
#[derive(Debug, Clone)]
pub struct EnrichmentResult {
    pub job: EnrichmentJob,
    pub status: EnrichmentStatus,
    pub actual_cost_usd: f64,
    pub tokens_used: u64,
    pub outputs: Option<serde_json::Value>,
    pub error: Option<FailureKind>,
    pub message: Option<String>,
}

impl EnrichmentResult {
    pub fn succeeded(job: EnrichmentJob, output: EnrichmentOutput) -> Self {
        Self {
            job,
            status: EnrichmentStatus::Succeeded,
            actual_cost_usd: output.cost_usd,
            tokens_used: output.tokens_used,
            outputs: Some(output.outputs),
            error: None,
            message: None,
        }
    }

    pub fn failed(job: EnrichmentJob, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            job,
            status: EnrichmentStatus::Failed,
            actual_cost_usd: 0.0,
            tokens_used: 0,
            outputs: None,
            error: Some(kind),
            message: Some(message.into()),
        }
    }

    pub fn not_submitted(job: EnrichmentJob) -> Self {
        Self {
            job,
            status: EnrichmentStatus::NotSubmitted,
            actual_cost_usd: 0.0,
            tokens_used: 0,
            outputs: None,
            error: Some(FailureKind::BudgetExceeded),
            message: None,
        }
    }

    pub fn cancelled(job: EnrichmentJob) -> Self {
        Self {
            job,
            status: EnrichmentStatus::Cancelled,
            actual_cost_usd: 0.0,
            tokens_used: 0,
            outputs: None,
            error: Some(FailureKind::Cancelled),
            message: None,
        }
    }

    pub fn success(&self) -> bool {
        self.status == EnrichmentStatus::Succeeded
    }
}

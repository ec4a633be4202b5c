/// Failure taxonomy shared by both pipelines
///
/// Every failed or stopped unit of work is classified into exactly one of
/// these kinds. The run summary reports counts per kind.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Timeout, connection reset, 5xx or 429 throttling (retried)
    TransientNetwork,

    /// 4xx other than 429 (terminal)
    Client,

    /// Fetch succeeded but produced zero usable items, or content was malformed
    Extraction,

    /// Not submitted because the spending ceiling was reached
    BudgetExceeded,

    /// Stopped by the run-level cancel signal
    Cancelled,

    /// Worker panicked or a local invariant broke
    Internal,
}

impl FailureKind {
    /// Returns true if a unit of work failing this way may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork)
    }

    /// Returns true for run-level stop conditions rather than task errors
    pub fn is_stop_condition(&self) -> bool {
        matches!(self, Self::BudgetExceeded | Self::Cancelled)
    }

    /// Converts the kind to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient_network",
            Self::Client => "client",
            Self::Extraction => "extraction",
            Self::BudgetExceeded => "budget_exceeded",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }

    /// Parses a kind from its database string representation
    ///
    /// Returns None if the string doesn't match any known kind.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "transient_network" => Some(Self::TransientNetwork),
            "client" => Some(Self::Client),
            "extraction" => Some(Self::Extraction),
            "budget_exceeded" => Some(Self::BudgetExceeded),
            "cancelled" => Some(Self::Cancelled),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }

    /// Returns all failure kinds in report order
    pub fn all() -> Vec<Self> {
        vec![
            Self::TransientNetwork,
            Self::Client,
            Self::Extraction,
            Self::BudgetExceeded,
            Self::Cancelled,
            Self::Internal,
        ]
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

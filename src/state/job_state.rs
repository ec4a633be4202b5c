/// Lifecycle of an enrichment job
///
/// ```text
/// Pending -> Reserved -> InFlight -> Succeeded
///                ^           |-----> FailedRetryable -> Reserved
///                            |-----> FailedTerminal
/// Pending -> NotSubmitted
/// Pending | Reserved | FailedRetryable -> Cancelled
/// ```
///
/// A job is charged against the budget once, on its first move to
/// `Reserved`; returning there from `FailedRetryable` keeps the original
/// reservation.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Pending,
    Reserved,
    InFlight,
    FailedRetryable,

    // ===== Terminal States =====
    Succeeded,
    FailedTerminal,
    NotSubmitted,
    Cancelled,
}

impl JobState {
    /// Returns true if the job needs no further processing
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::FailedTerminal | Self::NotSubmitted | Self::Cancelled
        )
    }

    /// Returns true if the job currently holds a budget reservation
    pub fn holds_reservation(&self) -> bool {
        matches!(self, Self::Reserved | Self::InFlight | Self::FailedRetryable)
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Pending, Reserved)
                | (Pending, NotSubmitted)
                | (Pending, Cancelled)
                | (Reserved, InFlight)
                | (Reserved, Cancelled)
                | (InFlight, Succeeded)
                | (InFlight, FailedRetryable)
                | (InFlight, FailedTerminal)
                | (FailedRetryable, Reserved)
                | (FailedRetryable, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Reserved => "reserved",
            Self::InFlight => "in_flight",
            Self::FailedRetryable => "failed_retryable",
            Self::Succeeded => "succeeded",
            Self::FailedTerminal => "failed_terminal",
            Self::NotSubmitted => "not_submitted",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

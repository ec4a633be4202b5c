//! Classify errors into the failure taxonomy.

use crate::state::FailureKind;

/// Implemented by capability errors so the retry coordinator can decide
/// whether to try again.
pub trait Classify {
    /// The taxonomy bucket this error belongs to.
    fn failure_kind(&self) -> FailureKind;

    /// True if another attempt may succeed.
    fn is_retryable(&self) -> bool {
        self.failure_kind().is_retryable()
    }
}

impl Classify for FailureKind {
    fn failure_kind(&self) -> FailureKind {
        *self
    }
}

/// Classify a non-success HTTP status code.
pub fn classify_http_status(code: u16) -> FailureKind {
    match code {
        429 => FailureKind::TransientNetwork,
        500..=599 => FailureKind::TransientNetwork,
        _ => FailureKind::Client,
    }
}

/// Classify a transport-level reqwest error.
pub fn classify_reqwest_error(e: &reqwest::Error) -> FailureKind {
    if let Some(status) = e.status() {
        return classify_http_status(status.as_u16());
    }
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        return FailureKind::TransientNetwork;
    }
    if e.is_decode() {
        return FailureKind::Extraction;
    }
    if e.is_builder() {
        return FailureKind::Internal;
    }
    FailureKind::TransientNetwork
}

//! Error taxonomy for fetch submissions.
//!
//! Three classes of outcome are distinguished by the engine:
//!
//! - **Cancellation** ([`FetchError::Cancelled`]): expected and silent. Never
//!   stored in state and never passed to a callback.
//! - **Transport exceptions** (every other [`FetchError`] variant): network
//!   failures, timeouts, undecodable bodies and projector rejections. Surfaced
//!   through [`FetchState::Exception`](crate::state::FetchState::Exception)
//!   and the `on_exception` callback.
//! - **Application errors**: a response that arrived with a non-success
//!   status. These are not a `FetchError` at all; the body is projected into
//!   the caller's error type instead.

use thiserror::Error;

/// Errors produced while executing a single fetch submission.
///
/// Payloads are stringly typed so the error can be cloned into state
/// snapshots and compared in tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The submission was superseded, aborted or its owner detached.
    #[error("Request cancelled")]
    Cancelled,

    /// The transport could not complete the exchange (connection refused,
    /// DNS failure, reset, ...).
    #[error("Network error: {0}")]
    Network(String),

    /// The transport gave up waiting for a response.
    #[error("Request timed out")]
    Timeout,

    /// The request could not be built (bad URL, bad header value, ...).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The response body was not valid JSON.
    #[error("Failed to decode response body: {0}")]
    Decode(String),

    /// A projector rejected the decoded body.
    #[error("Failed to project response body: {0}")]
    Projection(String),
}

impl FetchError {
    /// Whether this error is the silent cancellation class.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Short, stable label used for metrics and log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Network(_) => "network",
            Self::Timeout => "timeout",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Decode(_) => "decode",
            Self::Projection(_) => "projection",
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

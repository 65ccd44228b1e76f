//! Observable lifecycle state of a fetch engine.

use crate::error::FetchError;
use http::{HeaderMap, StatusCode};

/// The single observable state of one fetch engine.
///
/// Each variant corresponds to one lifecycle state. Because the state is an
/// enum, at most one of `loading`, `success` and `error` can be true at any
/// time, which is the invariant hosts rely on when rendering.
///
/// # Type Parameters
///
/// - `R`: Projected success result
/// - `E`: Projected error result (body of a non-success response)
#[derive(Debug, Clone, PartialEq)]
pub enum FetchState<R, E> {
    /// No request in flight. Initial rest state and the state right after a
    /// cancellation.
    Idle,

    /// A submission is awaiting the transport.
    Loading,

    /// The transport returned a success status and the body was projected.
    Success {
        /// Response status code
        status: StatusCode,
        /// Response headers
        headers: HeaderMap,
        /// Projected result
        result: R,
    },

    /// The transport returned a non-success status and the body was projected
    /// into the error type.
    Failed {
        /// Response status code
        status: StatusCode,
        /// Response headers
        headers: HeaderMap,
        /// Projected error body
        error_result: E,
    },

    /// The exchange failed with an exception rather than a response.
    Exception {
        /// Status of the response, if one was received before the failure.
        /// `None` is the "unknown" sentinel.
        status: Option<StatusCode>,
        /// What went wrong
        cause: FetchError,
    },
}

impl<R, E> Default for FetchState<R, E> {
    fn default() -> Self {
        Self::Idle
    }
}

impl<R, E> FetchState<R, E> {
    /// `{}`: nothing in flight and no outcome to show.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// A submission is awaiting the transport.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// The last submission finished successfully.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The last submission finished with either an error response or an
    /// exception.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Exception { .. })
    }

    /// Whether the state is one of the terminal outcomes.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.is_success() || self.is_error()
    }

    /// Status code of the response, if one was received.
    #[must_use]
    pub const fn response_status(&self) -> Option<StatusCode> {
        match self {
            Self::Success { status, .. } | Self::Failed { status, .. } => Some(*status),
            Self::Exception { status, .. } => *status,
            Self::Idle | Self::Loading => None,
        }
    }

    /// Headers of the response, present whenever a response was projected.
    #[must_use]
    pub const fn response_headers(&self) -> Option<&HeaderMap> {
        match self {
            Self::Success { headers, .. } | Self::Failed { headers, .. } => Some(headers),
            _ => None,
        }
    }

    /// Projected result. Present iff [`is_success`](Self::is_success).
    #[must_use]
    pub const fn result(&self) -> Option<&R> {
        match self {
            Self::Success { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Projected error body. Present iff the state is an error response.
    #[must_use]
    pub const fn error_result(&self) -> Option<&E> {
        match self {
            Self::Failed { error_result, .. } => Some(error_result),
            _ => None,
        }
    }

    /// Exception cause. Present iff the state is an exception.
    #[must_use]
    pub const fn cause(&self) -> Option<&FetchError> {
        match self {
            Self::Exception { cause, .. } => Some(cause),
            _ => None,
        }
    }

    /// Name of the variant, for logs and metrics labels.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Success { .. } => "success",
            Self::Failed { .. } => "failed",
            Self::Exception { .. } => "exception",
        }
    }
}

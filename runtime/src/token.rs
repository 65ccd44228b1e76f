//! Per-submission cancellation tokens.
//!
//! Every `submit` mints a fresh [`SubmissionToken`]. The engine keeps at most
//! one of them as "current"; a settlement is applied only if its token is
//! still the current one, compared by [`SubmissionId`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Identity of one submission within an engine.
///
/// Ids are allocated in increasing order, so a later submission always has a
/// larger id than an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmissionId(u64);

impl SubmissionId {
    /// Raw value, for logs and metrics
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic source of [`SubmissionId`]s.
#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub(crate) fn next(&self) -> SubmissionId {
        SubmissionId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Cancellation signal for a single submission.
///
/// Cloning shares the signal: cancelling any clone cancels them all. The
/// transport receives a child token, so cancelling the submission also
/// cancels the transport call but not the other way round.
#[derive(Debug, Clone)]
pub struct SubmissionToken {
    id: SubmissionId,
    cancel: CancellationToken,
}

impl SubmissionToken {
    pub(crate) fn new(id: SubmissionId) -> Self {
        Self {
            id,
            cancel: CancellationToken::new(),
        }
    }

    /// Which submission this token belongs to
    #[must_use]
    pub const fn id(&self) -> SubmissionId {
        self.id
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the signal has fired
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the signal fires
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Token handed to the transport for this submission
    #[must_use]
    pub fn transport_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Whether `self` and `other` belong to the same submission
    #[must_use]
    pub fn is_same(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase() {
        let ids = IdAllocator::default();
        let a = ids.next();
        let b = ids.next();
        assert!(b > a);
        assert_eq!(a.get(), 1);
        assert_eq!(b.to_string(), "#2");
    }

    #[test]
    fn cancelling_a_clone_cancels_the_original_and_the_transport_token() {
        let token = SubmissionToken::new(IdAllocator::default().next());
        let transport = token.transport_token();
        let clone = token.clone();

        clone.cancel();

        assert!(token.is_cancelled());
        assert!(transport.is_cancelled());
        assert!(token.is_same(&clone));
    }

    #[test]
    fn cancelling_the_transport_token_leaves_the_submission_alone() {
        let token = SubmissionToken::new(IdAllocator::default().next());
        token.transport_token().cancel();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let token = SubmissionToken::new(IdAllocator::default().next());
        let waiter = token.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        token.cancel();
        assert!(task.await.is_ok());
    }
}

//! Lifecycle guard: gates publication on the host still being attached.

use std::sync::atomic::{AtomicU8, Ordering};

/// Where the owning host is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecyclePhase {
    /// Engine built, host not attached yet
    Created = 0,
    /// Host attached; publications are delivered
    Attached = 1,
    /// Host gone; publications are dropped for good
    Detached = 2,
}

impl LifecyclePhase {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Attached,
            2 => Self::Detached,
            _ => Self::Created,
        }
    }
}

/// Tracks the host's lifecycle and drops publications made while it is not
/// attached.
///
/// Phases only move forward: `Created → Attached → Detached`, or straight
/// to `Detached`. Once detached the guard never publishes again.
#[derive(Debug)]
pub struct LifecycleGuard {
    phase: AtomicU8,
}

impl LifecycleGuard {
    /// Guard in the `Created` phase
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: AtomicU8::new(LifecyclePhase::Created as u8),
        }
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> LifecyclePhase {
        LifecyclePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Whether publications are currently delivered
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.phase() == LifecyclePhase::Attached
    }

    /// Move `Created → Attached`.
    ///
    /// Returns `false` if the guard was already attached or detached.
    pub fn attach(&self) -> bool {
        self.phase
            .compare_exchange(
                LifecyclePhase::Created as u8,
                LifecyclePhase::Attached as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `Detached`.
    ///
    /// Returns `false` if the guard was already detached.
    pub fn detach(&self) -> bool {
        self.phase.swap(LifecyclePhase::Detached as u8, Ordering::AcqRel)
            != LifecyclePhase::Detached as u8
    }

    /// Run `publish` only while attached. Returns whether it ran.
    pub fn publish<F: FnOnce()>(&self, publish: F) -> bool {
        if self.is_mounted() {
            publish();
            true
        } else {
            tracing::trace!(phase = ?self.phase(), "Dropping publication, host not attached");
            false
        }
    }
}

impl Default for LifecycleGuard {
    fn default() -> Self {
        Self::new()
    }
}

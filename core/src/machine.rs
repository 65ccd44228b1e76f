//! The fetch lifecycle state machine.
//!
//! [`FetchReducer`] is the only thing that mutates a [`FetchState`]. It is a
//! pure function of `(state, transition)` and returns effect descriptions
//! that the runtime executes: publishing the new state to observers and
//! notifying outcome callbacks.
//!
//! ```text
//!            Start                 Settle(terminal)
//!   Idle ───────────▶ Loading ─────────────────────▶ Success | Failed | Exception
//!    ▲                   │                                   │
//!    └──── Cancel ───────┘◀──────────── Start ───────────────┘
//! ```
//!
//! `Cancel` and `Start` are accepted from any state; `Settle` only from
//! `Loading`.

use crate::reducer::Reducer;
use crate::state::FetchState;
use smallvec::{SmallVec, smallvec};
use std::marker::PhantomData;

/// Inputs to the fetch state machine. Only the engine issues these.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition<R, E> {
    /// The current submission was invalidated: back to `Idle`.
    Cancel,
    /// A new submission began: `Loading`.
    Start,
    /// The current submission finished with the given terminal state.
    Settle(FetchState<R, E>),
}

/// Effects produced by [`FetchReducer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchEffect {
    /// Publish the new state to the host's state slot and observers.
    Publish,
    /// Invoke the outcome callback matching the new (terminal) state.
    Notify,
}

/// Reducer for [`FetchState<R, E>`].
pub struct FetchReducer<R, E> {
    _types: PhantomData<fn() -> (R, E)>,
}

impl<R, E> FetchReducer<R, E> {
    /// Create the reducer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _types: PhantomData,
        }
    }
}

impl<R, E> Default for FetchReducer<R, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, E> Clone for FetchReducer<R, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R, E> Copy for FetchReducer<R, E> {}

impl<R, E> std::fmt::Debug for FetchReducer<R, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FetchReducer")
    }
}

impl<R, E> Reducer for FetchReducer<R, E> {
    type State = FetchState<R, E>;
    type Action = Transition<R, E>;
    type Environment = ();
    type Effect = FetchEffect;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[FetchEffect; 2]> {
        match action {
            Transition::Cancel => {
                *state = FetchState::Idle;
                smallvec![FetchEffect::Publish]
            },
            Transition::Start => {
                *state = FetchState::Loading;
                smallvec![FetchEffect::Publish]
            },
            Transition::Settle(next) => {
                if !state.is_loading() || !next.is_settled() {
                    return SmallVec::new();
                }
                *state = next;
                smallvec![FetchEffect::Publish, FetchEffect::Notify]
            },
        }
    }
}

//! Synchronous state observers.

use composable_fetch_core::FetchState;

/// Receives every state the engine publishes, in order.
///
/// Observers run after the engine has released its internal lock, in the
/// order the publications happened. They may call back into the engine
/// (`state`, `is_in_flight`, even `submit` or `abort`); a publication made from
/// inside an observer is delivered once the current one has been seen by
/// every observer. Use [`FetchEngine::subscribe`](crate::FetchEngine::subscribe)
/// for anything asynchronous.
///
/// Closures taking `&FetchState<R, E>` implement this trait.
pub trait StateObserver<R, E>: Send + Sync {
    /// Called with the newly published state
    fn on_state(&self, state: &FetchState<R, E>);
}

impl<R, E, F> StateObserver<R, E> for F
where
    F: Fn(&FetchState<R, E>) + Send + Sync,
{
    fn on_state(&self, state: &FetchState<R, E>) {
        self(state);
    }
}

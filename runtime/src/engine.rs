//! The execution controller.
//!
//! A [`FetchEngine`] owns one [`FetchState`] and runs at most one submission
//! at a time. Submitting while a request is in flight cancels the earlier
//! one; a settlement is applied only if its submission is still the current
//! one when it arrives.
//!
//! # Submission flow
//!
//! 1. Under the slot lock: cancel the current submission (publishing `Idle`),
//!    mint a new [`SubmissionToken`] and publish `Loading`.
//! 2. Snapshot the latest [`FetchConfig`] and spawn the submission task.
//! 3. The task prepares the request and races the transport against the
//!    token.
//! 4. The outcome is classified outside the lock, then applied under the
//!    lock if the token is still current.
//! 5. Observers and then outcome callbacks run after the lock is released.
//!
//! Nothing user-supplied runs under the slot lock, so observers and
//! callbacks may call back into the engine.

use crate::error::EngineError;
use crate::guard::LifecycleGuard;
use crate::latest::LatestConfig;
use crate::metrics::FetchMetrics;
use crate::observer::StateObserver;
use crate::options::EngineOptions;
use crate::token::{IdAllocator, SubmissionId, SubmissionToken};
use composable_fetch_core::reducer::Reducer;
use composable_fetch_core::{
    FetchConfig, FetchEffect, FetchError, FetchReducer, FetchResponse, FetchState, Transition,
    Transport,
};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// How a submission ended, as seen by whoever submitted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// `Success` was published
    Succeeded,
    /// `Failed` (non-success status) was published
    Failed,
    /// `Exception` was published
    Excepted,
    /// The submission was cancelled before it settled
    Cancelled,
    /// The submission settled but was no longer current, or its task died
    /// before settling; nothing was published
    Superseded,
}

impl SubmissionOutcome {
    /// Short, stable label used for metrics and log fields
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Succeeded => "success",
            Self::Failed => "error",
            Self::Excepted => "exception",
            Self::Cancelled => "cancelled",
            Self::Superseded => "superseded",
        }
    }

    const fn of<R, E>(state: &FetchState<R, E>) -> Self {
        match state {
            FetchState::Success { .. } => Self::Succeeded,
            FetchState::Failed { .. } => Self::Failed,
            FetchState::Exception { .. } => Self::Excepted,
            FetchState::Idle | FetchState::Loading => Self::Superseded,
        }
    }
}

/// Handle to a spawned submission.
///
/// Dropping the handle does not cancel the submission; use
/// [`FetchEngine::abort`] for that.
#[derive(Debug)]
pub struct SubmissionHandle {
    id: SubmissionId,
    task: JoinHandle<SubmissionOutcome>,
}

impl SubmissionHandle {
    /// Id of the submission
    #[must_use]
    pub const fn id(&self) -> SubmissionId {
        self.id
    }

    /// Whether the submission task has finished
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the submission to finish.
    ///
    /// Never fails: a task that died (a projector or callback panicked) is
    /// logged and reported as [`SubmissionOutcome::Superseded`].
    pub async fn wait(self) -> SubmissionOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(submission = %self.id, error = %error, "Submission task failed");
                SubmissionOutcome::Superseded
            },
        }
    }

    /// Wait for the submission with a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Timeout`] if the submission has not finished
    /// within `timeout`. The submission keeps running.
    pub async fn wait_with_timeout(
        self,
        timeout: Duration,
    ) -> Result<SubmissionOutcome, EngineError> {
        let id = self.id;
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| EngineError::Timeout(id))
    }
}

struct Slot<R, E> {
    state: FetchState<R, E>,
    current: Option<SubmissionToken>,
}

struct EngineInner<A, R, E> {
    config: LatestConfig<A, R, E>,
    transport: Arc<dyn Transport>,
    reducer: FetchReducer<R, E>,
    slot: Mutex<Slot<R, E>>,
    published: watch::Sender<FetchState<R, E>>,
    observers: Vec<Arc<dyn StateObserver<R, E>>>,
    outbox: Mutex<VecDeque<FetchState<R, E>>>,
    delivering: AtomicBool,
    guard: LifecycleGuard,
    initial_args: Mutex<Option<A>>,
    ids: IdAllocator,
    options: EngineOptions,
}

impl<A, R, E> EngineInner<A, R, E>
where
    R: Clone,
    E: Clone,
{
    fn lock_slot(&self) -> MutexGuard<'_, Slot<R, E>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the slot lock, then deliver what it published.
    fn with_slot<T>(&self, f: impl FnOnce(&mut Slot<R, E>) -> T) -> T {
        let out = f(&mut self.lock_slot());
        self.deliver();
        out
    }

    /// Reduce `transition` and run the publish effect. Returns whether the
    /// reducer asked for outcome callbacks.
    fn apply(&self, slot: &mut Slot<R, E>, transition: Transition<R, E>) -> bool {
        let mut notify = false;
        for effect in self.reducer.reduce(&mut slot.state, transition, &()) {
            match effect {
                FetchEffect::Publish => self.publish(&slot.state),
                FetchEffect::Notify => notify = true,
            }
        }
        notify
    }

    fn publish(&self, state: &FetchState<R, E>) {
        self.guard.publish(|| {
            tracing::trace!(engine = %self.options.name, state = state.label(), "Publishing state");
            self.published.send_replace(state.clone());
            if !self.observers.is_empty() {
                self.outbox
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push_back(state.clone());
            }
        });
    }

    /// Hand queued publications to the observers, outside the slot lock.
    ///
    /// One caller drains at a time. A call made while another is draining
    /// (from an observer, or from another thread) only queues, so observers
    /// still see publications in the order they happened.
    fn deliver(&self) {
        while !self.delivering.swap(true, Ordering::AcqRel) {
            let draining = Draining(&self.delivering);
            while let Some(state) = self.next_queued() {
                for observer in &self.observers {
                    observer.on_state(&state);
                }
            }
            drop(draining);

            // Something may have been queued between the last pop and the reset
            if self
                .outbox
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_empty()
            {
                return;
            }
        }
    }

    fn next_queued(&self) -> Option<FetchState<R, E>> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Publish the state reached before the host attached.
    ///
    /// Until attach the watch channel only ever holds the initial `Idle` or
    /// `Loading`, neither of which carries data, so comparing labels is exact.
    fn catch_up(&self, slot: &Slot<R, E>) {
        let seen = self.published.borrow().label();
        if slot.state.label() != seen {
            tracing::debug!(
                engine = %self.options.name,
                state = slot.state.label(),
                "Publishing state reached before attach"
            );
            self.publish(&slot.state);
        }
    }

    fn is_current(slot: &Slot<R, E>, token: &SubmissionToken) -> bool {
        slot.current
            .as_ref()
            .is_some_and(|current| current.is_same(token))
    }

    /// Cancel whatever is in flight and publish `Idle`.
    fn cancel_current(&self, slot: &mut Slot<R, E>, reason: &'static str) -> bool {
        let Some(token) = slot.current.take() else {
            return false;
        };
        token.cancel();
        tracing::debug!(
            engine = %self.options.name,
            submission = %token.id(),
            reason,
            "Cancelling in-flight submission"
        );
        if self.options.record_metrics {
            FetchMetrics::record_cancellation(&self.options.name);
        }
        self.apply(slot, Transition::Cancel);
        true
    }

    /// Drop `token` without a terminal state. No-op unless it is current.
    fn abandon(&self, token: &SubmissionToken) -> bool {
        self.with_slot(|slot| {
            if !Self::is_current(slot, token) {
                return false;
            }
            slot.current = None;
            self.apply(slot, Transition::Cancel);
            true
        })
    }

    fn settle(
        &self,
        token: &SubmissionToken,
        next: FetchState<R, E>,
        config: &FetchConfig<A, R, E>,
        started: Instant,
    ) -> SubmissionOutcome {
        let outcome = SubmissionOutcome::of(&next);
        let applied = self.with_slot(|slot| {
            if !Self::is_current(slot, token) {
                return None;
            }
            if let FetchState::Exception { status, cause } = &next {
                if self.options.log_exceptions {
                    tracing::warn!(
                        engine = %self.options.name,
                        submission = %token.id(),
                        status = ?status,
                        kind = cause.kind(),
                        error = %cause,
                        "Submission failed with an exception"
                    );
                }
            }
            slot.current = None;
            let wants_callbacks = self.apply(slot, Transition::Settle(next));
            Some(wants_callbacks.then(|| slot.state.clone()))
        });

        let Some(settled) = applied else {
            tracing::debug!(
                submission = %token.id(),
                outcome = outcome.label(),
                "Discarding settlement of a stale submission"
            );
            if self.options.record_metrics {
                FetchMetrics::record_discarded(&self.options.name);
            }
            return SubmissionOutcome::Superseded;
        };

        if self.options.record_metrics {
            FetchMetrics::record_settlement(&self.options.name, outcome.label(), started.elapsed());
        }
        if let Some(state) = settled {
            // The host may have detached since the state was applied
            if self.guard.is_mounted() {
                notify(config, &state);
            }
        }
        outcome
    }
}

impl<A, R, E> EngineInner<A, R, E>
where
    A: Send + 'static,
    R: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    async fn run(
        self: Arc<Self>,
        token: SubmissionToken,
        config: Arc<FetchConfig<A, R, E>>,
        args: A,
    ) -> SubmissionOutcome {
        let started = Instant::now();
        let mut pending = PendingSettlement {
            engine: &*self,
            token: &token,
            armed: true,
        };

        let request = config.prepare(&args);
        tracing::debug!(
            method = %request.init.method,
            resource = %request.resource,
            "Sending request"
        );

        let result = tokio::select! {
            biased;
            () = token.cancelled() => Err(FetchError::Cancelled),
            result = self.transport.fetch(request, token.transport_token()) => result,
        };

        let next = match result {
            Err(cause) if cause.is_cancellation() => {
                // The transport may give up on its own; that still counts as
                // a silent cancellation.
                self.abandon(&token);
                pending.armed = false;
                tracing::debug!("Submission cancelled before settling");
                return SubmissionOutcome::Cancelled;
            },
            Err(cause) => FetchState::Exception {
                status: None,
                cause,
            },
            Ok(response) => classify(&config, response),
        };

        let outcome = self.settle(&token, next, &config, started);
        pending.armed = false;
        outcome
    }
}

/// Clears the delivery flag even if an observer panics.
struct Draining<'a>(&'a AtomicBool);

impl Drop for Draining<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Resets the engine if a submission task unwinds before settling, so the
/// state does not stay `Loading` forever.
struct PendingSettlement<'a, A, R, E>
where
    R: Clone,
    E: Clone,
{
    engine: &'a EngineInner<A, R, E>,
    token: &'a SubmissionToken,
    armed: bool,
}

impl<A, R, E> Drop for PendingSettlement<'_, A, R, E>
where
    R: Clone,
    E: Clone,
{
    fn drop(&mut self) {
        if self.armed && self.engine.abandon(self.token) {
            tracing::error!(
                submission = %self.token.id(),
                "Submission ended without settling, state reset to idle"
            );
        }
    }
}

/// Turn a transport response into the terminal state it settles to.
fn classify<A, R, E>(config: &FetchConfig<A, R, E>, response: FetchResponse) -> FetchState<R, E> {
    let body = response.json();
    let FetchResponse {
        status, headers, ..
    } = response;

    let body = match body {
        Ok(body) => body,
        Err(cause) => {
            return FetchState::Exception {
                status: Some(status),
                cause,
            };
        },
    };

    if status.is_success() {
        match config.project_result(body) {
            Ok(result) => FetchState::Success {
                status,
                headers,
                result,
            },
            Err(cause) => FetchState::Exception {
                status: Some(status),
                cause,
            },
        }
    } else {
        match config.project_error(body) {
            Ok(error_result) => FetchState::Failed {
                status,
                headers,
                error_result,
            },
            Err(cause) => FetchState::Exception {
                status: Some(status),
                cause,
            },
        }
    }
}

fn notify<A, R, E>(config: &FetchConfig<A, R, E>, state: &FetchState<R, E>) {
    match state {
        FetchState::Success {
            status,
            headers,
            result,
        } => {
            if let Some(callback) = config.success_callback() {
                callback(result, *status, headers);
            }
        },
        FetchState::Failed {
            status,
            headers,
            error_result,
        } => {
            if let Some(callback) = config.error_callback() {
                callback(error_result, *status, headers);
            }
        },
        FetchState::Exception { cause, .. } => {
            if let Some(callback) = config.exception_callback() {
                callback(cause);
            }
        },
        FetchState::Idle | FetchState::Loading => {},
    }
}

/// Single-flight request engine.
///
/// Cheap to clone; clones share the same state and in-flight submission.
///
/// # Type Parameters
///
/// - `A`: Arguments passed to [`submit`](Self::submit)
/// - `R`: Success result type
/// - `E`: Error-response result type
///
/// # Example
///
/// ```ignore
/// let engine = FetchEngine::builder(config, Arc::new(ReqwestTransport::new()?))
///     .options(EngineOptions::default().with_name("quotes"))
///     .build();
///
/// let _mounted = engine.attach();
/// let outcome = engine.submit("AAPL".to_string()).wait().await;
/// engine.with_state(|s| println!("{}", s.label()));
/// ```
pub struct FetchEngine<A, R, E> {
    inner: Arc<EngineInner<A, R, E>>,
}

impl<A, R, E> Clone for FetchEngine<A, R, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, R, E> FetchEngine<A, R, E>
where
    A: Send + 'static,
    R: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Start building an engine
    #[must_use]
    pub fn builder(
        config: FetchConfig<A, R, E>,
        transport: Arc<dyn Transport>,
    ) -> FetchEngineBuilder<A, R, E> {
        FetchEngineBuilder {
            config,
            transport,
            initial_args: None,
            options: EngineOptions::default(),
            observers: Vec::new(),
        }
    }

    /// Engine with default options, no initial submission and no observers
    #[must_use]
    pub fn new(config: FetchConfig<A, R, E>, transport: Arc<dyn Transport>) -> Self {
        Self::builder(config, transport).build()
    }

    /// Start a submission, cancelling any submission in flight.
    ///
    /// Publishes `Idle` (if something was cancelled) and then `Loading`
    /// before returning. The request itself runs on a spawned task.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[tracing::instrument(skip(self, args), fields(engine = %self.inner.options.name))]
    pub fn submit(&self, args: A) -> SubmissionHandle {
        let inner = &self.inner;
        let token = inner.with_slot(|slot| {
            inner.cancel_current(slot, "superseded");
            let token = SubmissionToken::new(inner.ids.next());
            slot.current = Some(token.clone());
            inner.apply(slot, Transition::Start);
            token
        });

        if inner.options.record_metrics {
            FetchMetrics::record_submission(&inner.options.name);
        }

        let id = token.id();
        let config = inner.config.load();
        let span = tracing::debug_span!(
            "fetch_submission",
            engine = %inner.options.name,
            submission = %id
        );
        let task = tokio::spawn(
            Arc::clone(inner)
                .run(token, config, args)
                .instrument(span),
        );

        SubmissionHandle { id, task }
    }

    /// Attach the host: start publishing and run the initial submission.
    ///
    /// A submission made before attach is not lost: its current state
    /// (`Loading`, or the terminal state it already reached) is published
    /// first. Outcome callbacks of a submission that settled before attach
    /// are not replayed.
    ///
    /// Only the first call has any effect. Returns the handle of the initial
    /// submission, if one was configured.
    pub fn on_attach(&self) -> Option<SubmissionHandle> {
        let inner = &self.inner;
        let attached = inner.with_slot(|slot| {
            let attached = inner.guard.attach();
            if attached {
                inner.catch_up(slot);
            }
            attached
        });
        if !attached {
            tracing::warn!(
                engine = %self.inner.options.name,
                phase = ?self.inner.guard.phase(),
                "Ignoring attach, engine is not freshly created"
            );
            return None;
        }
        tracing::info!(engine = %self.inner.options.name, "Engine attached");

        let initial = self
            .inner
            .initial_args
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        initial.map(|args| self.submit(args))
    }

    /// Attach and return a guard that detaches when dropped.
    pub fn attach(&self) -> MountGuard<A, R, E> {
        // The initial submission reports through state and callbacks
        drop(self.on_attach());
        MountGuard {
            engine: self.clone(),
        }
    }
}

impl<A, R, E> FetchEngine<A, R, E>
where
    R: Clone,
    E: Clone,
{
    /// Snapshot of the last published state
    #[must_use]
    pub fn state(&self) -> FetchState<R, E> {
        self.inner.published.borrow().clone()
    }

    /// Read the last published state without cloning it.
    ///
    /// `f` must not call back into the engine.
    pub fn with_state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&FetchState<R, E>) -> T,
    {
        f(&self.inner.published.borrow())
    }

    /// Receiver that is notified on every publication
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FetchState<R, E>> {
        self.inner.published.subscribe()
    }

    /// Cancel the in-flight submission, publishing `Idle`.
    ///
    /// Returns `false`, changing nothing, if no submission is in flight.
    pub fn abort(&self) -> bool {
        self.inner
            .with_slot(|slot| self.inner.cancel_current(slot, "aborted"))
    }

    /// Detach the host: stop publishing for good and cancel anything in
    /// flight.
    ///
    /// The phase flips before the cancellation, so the resulting `Idle` is
    /// never published.
    pub fn on_detach(&self) {
        if !self.inner.guard.detach() {
            return;
        }
        tracing::info!(engine = %self.inner.options.name, "Engine detached");

        self.inner
            .initial_args
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.inner
            .with_slot(|slot| self.inner.cancel_current(slot, "detached"));
    }

    /// Whether the host is attached
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.inner.guard.is_mounted()
    }

    /// Whether a submission is in flight
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.inner.lock_slot().current.is_some()
    }
}

impl<A, R, E> FetchEngine<A, R, E> {
    /// Replace the configuration used by later submissions.
    ///
    /// A submission already in flight keeps the configuration it started
    /// with, callbacks included.
    pub fn set_config(&self, config: FetchConfig<A, R, E>) {
        self.inner.config.store(config);
    }

    /// Snapshot of the current configuration
    #[must_use]
    pub fn config(&self) -> Arc<FetchConfig<A, R, E>> {
        self.inner.config.load()
    }

    /// Options the engine was built with
    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }
}

impl<A, R, E> fmt::Debug for FetchEngine<A, R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchEngine")
            .field("name", &self.inner.options.name)
            .field("state", &self.inner.published.borrow().label())
            .field("phase", &self.inner.guard.phase())
            .finish_non_exhaustive()
    }
}

/// Builder for [`FetchEngine`].
pub struct FetchEngineBuilder<A, R, E> {
    config: FetchConfig<A, R, E>,
    transport: Arc<dyn Transport>,
    initial_args: Option<A>,
    options: EngineOptions,
    observers: Vec<Arc<dyn StateObserver<R, E>>>,
}

impl<A, R, E> FetchEngineBuilder<A, R, E>
where
    A: Send + 'static,
    R: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Submit `args` as soon as the host attaches. The engine starts out
    /// `Loading`.
    #[must_use]
    pub fn initial_args(mut self, args: A) -> Self {
        self.initial_args = Some(args);
        self
    }

    /// Set engine options
    #[must_use]
    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Add a synchronous state observer
    #[must_use]
    pub fn observer<O>(mut self, observer: O) -> Self
    where
        O: StateObserver<R, E> + 'static,
    {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Build the engine. It publishes nothing until attached.
    #[must_use]
    pub fn build(self) -> FetchEngine<A, R, E> {
        let initial = if self.initial_args.is_some() {
            FetchState::Loading
        } else {
            FetchState::Idle
        };
        let (published, _) = watch::channel(initial.clone());

        FetchEngine {
            inner: Arc::new(EngineInner {
                config: LatestConfig::new(self.config),
                transport: self.transport,
                reducer: FetchReducer::new(),
                slot: Mutex::new(Slot {
                    state: initial,
                    current: None,
                }),
                published,
                observers: self.observers,
                outbox: Mutex::new(VecDeque::new()),
                delivering: AtomicBool::new(false),
                guard: LifecycleGuard::new(),
                initial_args: Mutex::new(self.initial_args),
                ids: IdAllocator::default(),
                options: self.options,
            }),
        }
    }
}

/// Detaches its engine when dropped.
#[must_use = "dropping the guard detaches the engine"]
pub struct MountGuard<A, R, E>
where
    R: Clone,
    E: Clone,
{
    engine: FetchEngine<A, R, E>,
}

impl<A, R, E> MountGuard<A, R, E>
where
    R: Clone,
    E: Clone,
{
    /// The attached engine
    #[must_use]
    pub const fn engine(&self) -> &FetchEngine<A, R, E> {
        &self.engine
    }
}

impl<A, R, E> Drop for MountGuard<A, R, E>
where
    R: Clone,
    E: Clone,
{
    fn drop(&mut self) {
        self.engine.on_detach();
    }
}

/// Build an engine from a configuration, a transport and optional initial
/// arguments.
///
/// With `Some(args)` the engine starts `Loading` and submits `args` when the
/// host attaches.
#[must_use]
pub fn create_request_engine<A, R, E>(
    config: FetchConfig<A, R, E>,
    transport: Arc<dyn Transport>,
    initial_args: Option<A>,
) -> FetchEngine<A, R, E>
where
    A: Send + 'static,
    R: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    let builder = FetchEngine::builder(config, transport);
    match initial_args {
        Some(args) => builder.initial_args(args).build(),
        None => builder.build(),
    }
}

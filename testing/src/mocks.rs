//! Mock transport and state recorder.

use composable_fetch_core::{
    FetchError, FetchRequest, FetchResponse, FetchState, Transport, TransportFuture,
};
use http::StatusCode;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

type Reply = Result<FetchResponse, FetchError>;

enum Scripted {
    Ready { reply: Reply, delay: Duration },
    Deferred(oneshot::Receiver<Reply>),
}

/// Scripted [`Transport`] for deterministic tests.
///
/// Replies are queued per resource and consumed in order. A request with no
/// queued reply fails with [`FetchError::Network`].
///
/// # Example
///
/// ```
/// use composable_fetch_testing::MockTransport;
/// use http::StatusCode;
/// use serde_json::json;
///
/// let transport = MockTransport::new();
/// transport.json("/users/1", StatusCode::OK, json!({"name": "Ada"}));
/// let pending = transport.defer("/users/2");
///
/// // ... submit, then settle the second request whenever the test wants:
/// pending.json(StatusCode::OK, json!({"name": "Grace"}));
/// ```
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<FetchRequest>>,
    cancellations: AtomicUsize,
    ignore_cancellation: bool,
}

impl MockTransport {
    /// Transport with no scripted replies
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Never observe the cancellation token, like a transport that cannot be
    /// interrupted.
    #[must_use]
    pub fn ignoring_cancellation(mut self) -> Self {
        self.ignore_cancellation = true;
        self
    }

    fn enqueue(&self, resource: impl Into<String>, scripted: Scripted) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(resource.into())
            .or_default()
            .push_back(scripted);
    }

    /// Queue an immediate reply
    pub fn respond(&self, resource: impl Into<String>, reply: Reply) {
        self.respond_after(resource, Duration::ZERO, reply);
    }

    /// Queue a reply that arrives after `delay`
    pub fn respond_after(&self, resource: impl Into<String>, delay: Duration, reply: Reply) {
        self.enqueue(resource, Scripted::Ready { reply, delay });
    }

    /// Queue an immediate JSON response
    pub fn json(&self, resource: impl Into<String>, status: StatusCode, body: serde_json::Value) {
        self.respond(resource, Ok(FetchResponse::json_body(status, &body)));
    }

    /// Queue a JSON response that arrives after `delay`
    pub fn json_after(
        &self,
        resource: impl Into<String>,
        delay: Duration,
        status: StatusCode,
        body: serde_json::Value,
    ) {
        self.respond_after(resource, delay, Ok(FetchResponse::json_body(status, &body)));
    }

    /// Queue an immediate transport failure
    pub fn fail(&self, resource: impl Into<String>, error: FetchError) {
        self.respond(resource, Err(error));
    }

    /// Queue a reply the test resolves by hand
    pub fn defer(&self, resource: impl Into<String>) -> DeferredReply {
        let (tx, rx) = oneshot::channel();
        self.enqueue(resource, Scripted::Deferred(rx));
        DeferredReply { tx }
    }

    /// Every request received so far, in order
    #[must_use]
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests received
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of requests that ended because their token fired
    #[must_use]
    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }

    fn take(&self, resource: &str) -> Option<Scripted> {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(resource)
            .and_then(VecDeque::pop_front)
    }
}

impl Transport for MockTransport {
    fn fetch(&self, request: FetchRequest, cancel: CancellationToken) -> TransportFuture<'_> {
        let resource = request.resource.clone();
        let scripted = self.take(&resource);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        let reply = async move {
            match scripted {
                None => Err(FetchError::Network(format!("no scripted reply for {resource}"))),
                Some(Scripted::Ready { reply, delay }) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    reply
                },
                Some(Scripted::Deferred(rx)) => rx.await.unwrap_or_else(|_| {
                    Err(FetchError::Network("deferred reply dropped".to_string()))
                }),
            }
        };

        Box::pin(async move {
            if self.ignore_cancellation {
                return reply.await;
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    self.cancellations.fetch_add(1, Ordering::SeqCst);
                    Err(FetchError::Cancelled)
                },
                reply = reply => reply,
            }
        })
    }
}

/// Resolves a reply queued with [`MockTransport::defer`].
#[derive(Debug)]
pub struct DeferredReply {
    tx: oneshot::Sender<Reply>,
}

impl DeferredReply {
    /// Deliver `reply`. Returns `false` if the request was already dropped.
    pub fn resolve(self, reply: Reply) -> bool {
        self.tx.send(reply).is_ok()
    }

    /// Deliver a JSON response
    pub fn json(self, status: StatusCode, body: serde_json::Value) -> bool {
        self.resolve(Ok(FetchResponse::json_body(status, &body)))
    }

    /// Deliver a transport failure
    pub fn fail(self, error: FetchError) -> bool {
        self.resolve(Err(error))
    }
}

/// Records every state published to it, in order.
///
/// Hand [`observer`](Self::observer) to the engine builder and inspect the
/// history afterwards.
pub struct StateRecorder<R, E> {
    states: Arc<Mutex<Vec<FetchState<R, E>>>>,
}

impl<R, E> StateRecorder<R, E>
where
    R: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self {
            states: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Observer closure that appends to this recorder
    pub fn observer(&self) -> impl Fn(&FetchState<R, E>) + Send + Sync + 'static {
        let states = Arc::clone(&self.states);
        move |state| {
            states
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(state.clone());
        }
    }

    /// Every state recorded so far
    #[must_use]
    pub fn states(&self) -> Vec<FetchState<R, E>> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Labels of every state recorded so far
    #[must_use]
    pub fn labels(&self) -> Vec<&'static str> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(FetchState::label)
            .collect()
    }

    /// The most recent state
    #[must_use]
    pub fn last(&self) -> Option<FetchState<R, E>> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl<R, E> Default for StateRecorder<R, E>
where
    R: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R, E> Clone for StateRecorder<R, E> {
    fn clone(&self) -> Self {
        Self {
            states: Arc::clone(&self.states),
        }
    }
}

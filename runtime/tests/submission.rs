//! Integration tests for engine submissions
//!
//! Covers settlement classification, supersession, abort, attach/detach,
//! observer re-entrancy and the callback contract against a scripted
//! transport.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use composable_fetch_core::{FetchConfig, FetchError, FetchRequest, FetchState, Transport};
use composable_fetch_runtime::{
    EngineError, EngineOptions, FetchEngine, SubmissionOutcome, create_request_engine,
};
use composable_fetch_testing::{MockTransport, StateRecorder, init_test_tracing};
use http::StatusCode;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Payload {
    v: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Problem {
    msg: String,
}

type Engine = FetchEngine<u32, Payload, Problem>;

#[derive(Default)]
struct Calls {
    success: Mutex<Vec<u32>>,
    error: Mutex<Vec<String>>,
    exception: Mutex<Vec<FetchError>>,
}

impl Calls {
    fn successes(&self) -> Vec<u32> {
        self.success.lock().unwrap().clone()
    }

    fn errors(&self) -> Vec<String> {
        self.error.lock().unwrap().clone()
    }

    fn exceptions(&self) -> Vec<FetchError> {
        self.exception.lock().unwrap().clone()
    }
}

fn config(calls: &Arc<Calls>) -> FetchConfig<u32, Payload, Problem> {
    let on_success = Arc::clone(calls);
    let on_error = Arc::clone(calls);
    let on_exception = Arc::clone(calls);
    FetchConfig::json(|n| FetchRequest::get(format!("/n/{n}")))
        .on_success(move |payload: &Payload, _, _| on_success.success.lock().unwrap().push(payload.v))
        .on_error(move |problem: &Problem, _, _| on_error.error.lock().unwrap().push(problem.msg.clone()))
        .on_exception(move |cause| on_exception.exception.lock().unwrap().push(cause.clone()))
}

struct Harness {
    transport: Arc<MockTransport>,
    recorder: StateRecorder<Payload, Problem>,
    calls: Arc<Calls>,
    engine: Engine,
}

fn harness_with(transport: MockTransport) -> Harness {
    init_test_tracing();
    let transport = Arc::new(transport);
    let recorder = StateRecorder::new();
    let calls = Arc::new(Calls::default());
    let dyn_transport: Arc<dyn Transport> = transport.clone();
    let engine = FetchEngine::builder(config(&calls), dyn_transport)
        .options(EngineOptions::default().with_name("submission-tests"))
        .observer(recorder.observer())
        .build();
    Harness {
        transport,
        recorder,
        calls,
        engine,
    }
}

fn harness() -> Harness {
    harness_with(MockTransport::new())
}

// ============================================================================
// Settlement
// ============================================================================

#[tokio::test]
async fn success_response_settles_to_success() {
    let h = harness();
    let _mounted = h.engine.attach();
    h.transport.json("/n/1", StatusCode::OK, json!({"v": 1}));

    let outcome = h.engine.submit(1).wait().await;

    assert_eq!(outcome, SubmissionOutcome::Succeeded);
    assert_eq!(h.recorder.labels(), ["loading", "success"]);
    let state = h.engine.state();
    assert_eq!(state.result(), Some(&Payload { v: 1 }));
    assert_eq!(state.response_status(), Some(StatusCode::OK));
    assert_eq!(h.calls.successes(), [1]);
    assert!(h.calls.errors().is_empty());
    assert!(h.calls.exceptions().is_empty());
}

#[tokio::test]
async fn error_status_settles_to_failed() {
    let h = harness();
    let _mounted = h.engine.attach();
    h.transport.json("/n/2", StatusCode::NOT_FOUND, json!({"msg": "nf"}));

    let outcome = h.engine.submit(2).wait().await;

    assert_eq!(outcome, SubmissionOutcome::Failed);
    let state = h.engine.state();
    assert!(state.is_error());
    assert!(!state.is_success());
    assert_eq!(state.error_result(), Some(&Problem { msg: "nf".into() }));
    assert_eq!(state.response_status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(h.calls.errors(), ["nf"]);
    assert!(h.calls.successes().is_empty());
}

#[tokio::test]
async fn network_failure_settles_to_exception_once() {
    let h = harness();
    let _mounted = h.engine.attach();
    h.transport.fail("/n/3", FetchError::Network("connection refused".into()));

    let outcome = h.engine.submit(3).wait().await;

    assert_eq!(outcome, SubmissionOutcome::Excepted);
    let state = h.engine.state();
    assert!(state.is_error());
    assert_eq!(state.response_status(), None);
    assert_eq!(
        h.calls.exceptions(),
        [FetchError::Network("connection refused".into())]
    );
}

#[tokio::test]
async fn undecodable_body_is_an_exception_with_status() {
    let h = harness();
    let _mounted = h.engine.attach();
    h.transport.respond(
        "/n/4",
        Ok(composable_fetch_core::FetchResponse::new(
            StatusCode::OK,
            http::HeaderMap::new(),
            bytes::Bytes::from_static(b"<html>"),
        )),
    );

    h.engine.submit(4).wait().await;

    match h.engine.state() {
        FetchState::Exception { status, cause } => {
            assert_eq!(status, Some(StatusCode::OK));
            assert_eq!(cause.kind(), "decode");
        },
        other => panic!("expected exception, got {other:?}"),
    }
    assert_eq!(h.calls.exceptions().len(), 1);
}

#[tokio::test]
async fn projection_mismatch_is_an_exception() {
    let h = harness();
    let _mounted = h.engine.attach();
    h.transport.json("/n/5", StatusCode::OK, json!({"v": "five"}));

    h.engine.submit(5).wait().await;

    assert!(matches!(
        h.engine.state().cause(),
        Some(FetchError::Projection(_))
    ));
    assert!(h.calls.successes().is_empty());
}

// ============================================================================
// Supersession and abort
// ============================================================================

#[tokio::test]
async fn newer_submission_supersedes_older() {
    let h = harness();
    let _mounted = h.engine.attach();
    let a = h.transport.defer("/n/10");
    let b = h.transport.defer("/n/20");

    let first = h.engine.submit(10);
    tokio::task::yield_now().await;
    let second = h.engine.submit(20);

    assert_eq!(h.recorder.labels(), ["loading", "idle", "loading"]);

    assert!(b.json(StatusCode::OK, json!({"v": 20})));
    assert_eq!(second.wait().await, SubmissionOutcome::Succeeded);
    assert_eq!(first.wait().await, SubmissionOutcome::Cancelled);

    // The superseded request was dropped along with its reply channel
    assert!(!a.json(StatusCode::OK, json!({"v": 10})));

    assert_eq!(h.recorder.labels(), ["loading", "idle", "loading", "success"]);
    assert_eq!(h.engine.state().result(), Some(&Payload { v: 20 }));
    assert_eq!(h.calls.successes(), [20]);
    assert_eq!(h.transport.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn late_reply_from_uninterruptible_transport_is_ignored() {
    let h = harness_with(MockTransport::new().ignoring_cancellation());
    let _mounted = h.engine.attach();
    h.transport
        .json_after("/n/1", Duration::from_millis(50), StatusCode::OK, json!({"v": 1}));
    h.transport
        .json_after("/n/2", Duration::from_millis(10), StatusCode::OK, json!({"v": 2}));

    let first = h.engine.submit(1);
    tokio::task::yield_now().await;
    let second = h.engine.submit(2);

    assert_eq!(second.wait().await, SubmissionOutcome::Succeeded);
    assert_eq!(first.wait().await, SubmissionOutcome::Cancelled);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.engine.state().result(), Some(&Payload { v: 2 }));
    assert_eq!(h.calls.successes(), [2]);
    assert_eq!(h.recorder.labels(), ["loading", "idle", "loading", "success"]);
}

#[tokio::test]
async fn abort_cancels_in_flight_submission() {
    let h = harness();
    let _mounted = h.engine.attach();
    let _pending = h.transport.defer("/n/7");

    let handle = h.engine.submit(7);
    assert!(h.engine.is_in_flight());
    assert!(h.engine.abort());

    assert_eq!(handle.wait().await, SubmissionOutcome::Cancelled);
    assert!(h.engine.state().is_idle());
    assert_eq!(h.recorder.labels(), ["loading", "idle"]);
    assert!(h.calls.successes().is_empty());
    assert!(h.calls.exceptions().is_empty());
}

#[tokio::test]
async fn abort_when_idle_changes_nothing() {
    let h = harness();
    let _mounted = h.engine.attach();

    assert!(!h.engine.abort());
    assert!(h.recorder.states().is_empty());
}

#[tokio::test]
async fn abort_after_settlement_keeps_the_outcome() {
    let h = harness();
    let _mounted = h.engine.attach();
    h.transport.json("/n/1", StatusCode::OK, json!({"v": 1}));
    h.engine.submit(1).wait().await;

    assert!(!h.engine.abort());
    assert!(h.engine.state().is_success());
}

#[tokio::test]
async fn resubmitting_after_settlement_starts_fresh() {
    let h = harness();
    let _mounted = h.engine.attach();
    h.transport.json("/n/1", StatusCode::NOT_FOUND, json!({"msg": "nf"}));
    h.transport.json("/n/1", StatusCode::OK, json!({"v": 1}));

    h.engine.submit(1).wait().await;
    h.engine.submit(1).wait().await;

    assert_eq!(h.recorder.labels(), ["loading", "failed", "loading", "success"]);
}

#[tokio::test]
async fn transport_reported_cancellation_is_silent() {
    let h = harness();
    let _mounted = h.engine.attach();
    h.transport.fail("/n/8", FetchError::Cancelled);

    let outcome = h.engine.submit(8).wait().await;

    assert_eq!(outcome, SubmissionOutcome::Cancelled);
    assert!(h.engine.state().is_idle());
    assert!(!h.engine.is_in_flight());
    assert!(h.calls.exceptions().is_empty());
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn nothing_is_published_after_detach() {
    let h = harness();
    let mounted = h.engine.attach();
    let pending = h.transport.defer("/n/9");

    let handle = h.engine.submit(9);
    tokio::task::yield_now().await;
    drop(mounted);

    assert!(!h.engine.is_mounted());
    assert_eq!(handle.wait().await, SubmissionOutcome::Cancelled);
    assert!(!pending.json(StatusCode::OK, json!({"v": 9})));

    // The abort-induced idle was never published
    assert_eq!(h.recorder.labels(), ["loading"]);
    assert!(h.engine.state().is_loading());
    assert!(h.calls.successes().is_empty());

    h.transport.json("/n/9", StatusCode::OK, json!({"v": 9}));
    h.engine.submit(9).wait().await;
    assert_eq!(h.recorder.labels(), ["loading"]);
    assert!(h.calls.successes().is_empty());
}

#[tokio::test]
async fn initial_arguments_run_on_attach() {
    let transport = Arc::new(MockTransport::new());
    transport.json("/n/42", StatusCode::OK, json!({"v": 42}));
    let calls = Arc::new(Calls::default());
    let dyn_transport: Arc<dyn Transport> = transport.clone();
    let engine = create_request_engine(config(&calls), dyn_transport, Some(42));

    assert!(engine.state().is_loading());
    assert_eq!(transport.request_count(), 0);

    let handle = engine.on_attach().expect("initial submission");
    assert_eq!(handle.wait().await, SubmissionOutcome::Succeeded);
    assert_eq!(engine.state().result(), Some(&Payload { v: 42 }));

    assert!(engine.on_attach().is_none());
}

#[tokio::test]
async fn detach_before_attach_drops_initial_arguments() {
    let transport = Arc::new(MockTransport::new());
    let calls = Arc::new(Calls::default());
    let dyn_transport: Arc<dyn Transport> = transport.clone();
    let engine = create_request_engine(config(&calls), dyn_transport, Some(1));

    engine.on_detach();

    assert!(engine.on_attach().is_none());
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn submission_before_attach_shows_loading_on_attach() {
    let h = harness();
    let pending = h.transport.defer("/n/1");

    let handle = h.engine.submit(1);
    tokio::task::yield_now().await;
    assert!(h.engine.is_in_flight());
    assert!(h.recorder.states().is_empty());

    let _mounted = h.engine.attach();
    assert!(h.engine.state().is_loading());
    assert_eq!(h.recorder.labels(), ["loading"]);

    assert!(pending.json(StatusCode::OK, json!({"v": 1})));
    assert_eq!(handle.wait().await, SubmissionOutcome::Succeeded);
    assert_eq!(h.recorder.labels(), ["loading", "success"]);
    assert_eq!(h.calls.successes(), [1]);
}

#[tokio::test]
async fn settlement_before_attach_is_published_on_attach() {
    let h = harness();
    h.transport.json("/n/2", StatusCode::OK, json!({"v": 2}));

    assert_eq!(h.engine.submit(2).wait().await, SubmissionOutcome::Succeeded);
    assert!(h.engine.state().is_idle());

    let _mounted = h.engine.attach();

    assert_eq!(h.engine.state().result(), Some(&Payload { v: 2 }));
    assert_eq!(h.recorder.labels(), ["success"]);
    // Callbacks of a settlement nobody was attached for are not replayed
    assert!(h.calls.successes().is_empty());
}

#[tokio::test]
async fn attach_without_prior_submission_publishes_nothing() {
    let h = harness();

    let _mounted = h.engine.attach();

    assert!(h.recorder.states().is_empty());
    assert!(h.engine.state().is_idle());
}

// ============================================================================
// Configuration and callbacks
// ============================================================================

#[tokio::test]
async fn projector_abort_discards_the_settlement() {
    init_test_tracing();
    let transport = Arc::new(MockTransport::new());
    transport.json("/n/1", StatusCode::OK, json!({"v": 1}));
    let calls = Arc::new(Calls::default());
    let recorder = StateRecorder::new();

    let cell: Arc<OnceLock<Engine>> = Arc::new(OnceLock::new());
    let engine_cell = Arc::clone(&cell);
    let on_success = Arc::clone(&calls);
    let config = FetchConfig::new(
        |n: &u32| FetchRequest::get(format!("/n/{n}")),
        move |body| {
            // The response is in hand, but the submission stops being current
            engine_cell.get().expect("engine registered").abort();
            serde_json::from_value::<Payload>(body).map_err(|e| FetchError::Projection(e.to_string()))
        },
        |body| {
            serde_json::from_value::<Problem>(body).map_err(|e| FetchError::Projection(e.to_string()))
        },
    )
    .on_success(move |payload: &Payload, _, _| on_success.success.lock().unwrap().push(payload.v));

    let dyn_transport: Arc<dyn Transport> = transport.clone();
    let engine: Engine = FetchEngine::builder(config, dyn_transport)
        .options(EngineOptions::default().with_name("discard"))
        .observer(recorder.observer())
        .build();
    assert!(cell.set(engine.clone()).is_ok());
    let _mounted = engine.attach();

    // The submission task runs on this thread, so a thread-local recorder sees it
    let prometheus = PrometheusBuilder::new().build_recorder();
    let rendered = prometheus.handle();
    let _local = metrics::set_default_local_recorder(&prometheus);

    let outcome = engine.submit(1).wait().await;

    assert_eq!(outcome, SubmissionOutcome::Superseded);
    assert!(engine.state().is_idle());
    assert!(!engine.is_in_flight());
    assert_eq!(recorder.labels(), ["loading", "idle"]);
    assert!(calls.successes().is_empty());
    assert!(
        rendered
            .render()
            .contains("fetch_discarded_total{engine=\"discard\"} 1")
    );
}

#[tokio::test]
async fn projector_resubmit_discards_the_older_settlement() {
    init_test_tracing();
    let transport = Arc::new(MockTransport::new());
    transport.json("/n/1", StatusCode::OK, json!({"v": 1}));
    let newer = transport.defer("/n/2");
    let calls = Arc::new(Calls::default());
    let recorder = StateRecorder::new();

    let cell: Arc<OnceLock<Engine>> = Arc::new(OnceLock::new());
    let follow_up: Arc<Mutex<Option<composable_fetch_runtime::SubmissionHandle>>> =
        Arc::new(Mutex::new(None));
    let engine_cell = Arc::clone(&cell);
    let slot = Arc::clone(&follow_up);
    let on_success = Arc::clone(&calls);
    let config = FetchConfig::new(
        |n: &u32| FetchRequest::get(format!("/n/{n}")),
        move |body| {
            let payload: Payload =
                serde_json::from_value(body).map_err(|e| FetchError::Projection(e.to_string()))?;
            if payload.v == 1 {
                let engine = engine_cell.get().expect("engine registered");
                *slot.lock().unwrap() = Some(engine.submit(2));
            }
            Ok(payload)
        },
        |body| {
            serde_json::from_value::<Problem>(body).map_err(|e| FetchError::Projection(e.to_string()))
        },
    )
    .on_success(move |payload: &Payload, _, _| on_success.success.lock().unwrap().push(payload.v));

    let dyn_transport: Arc<dyn Transport> = transport.clone();
    let engine: Engine = FetchEngine::builder(config, dyn_transport)
        .observer(recorder.observer())
        .build();
    assert!(cell.set(engine.clone()).is_ok());
    let _mounted = engine.attach();

    assert_eq!(engine.submit(1).wait().await, SubmissionOutcome::Superseded);
    assert_eq!(recorder.labels(), ["loading", "idle", "loading"]);
    assert!(calls.successes().is_empty());

    let second = follow_up.lock().unwrap().take().expect("newer submission");
    assert!(newer.json(StatusCode::OK, json!({"v": 2})));
    assert_eq!(second.wait().await, SubmissionOutcome::Succeeded);
    assert_eq!(recorder.labels(), ["loading", "idle", "loading", "success"]);
    assert_eq!(calls.successes(), [2]);
}


#[tokio::test]
async fn in_flight_submission_keeps_its_configuration() {
    let h = harness();
    let _mounted = h.engine.attach();
    let pending = h.transport.defer("/n/1");
    let handle = h.engine.submit(1);

    let replaced = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&replaced);
    h.engine.set_config(
        FetchConfig::json(|n| FetchRequest::get(format!("/v2/n/{n}")))
            .on_success(move |_: &Payload, _, _| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
    );

    pending.json(StatusCode::OK, json!({"v": 1}));
    handle.wait().await;
    assert_eq!(h.calls.successes(), [1]);
    assert_eq!(replaced.load(Ordering::SeqCst), 0);

    h.transport.json("/v2/n/2", StatusCode::OK, json!({"v": 2}));
    h.engine.submit(2).wait().await;
    assert_eq!(replaced.load(Ordering::SeqCst), 1);
    assert_eq!(h.transport.requests()[1].resource, "/v2/n/2");
}

#[tokio::test]
async fn callbacks_may_submit_again() {
    init_test_tracing();
    let transport = Arc::new(MockTransport::new());
    transport.json("/n/1", StatusCode::OK, json!({"v": 1}));
    transport.json("/n/2", StatusCode::OK, json!({"v": 2}));

    let cell: Arc<OnceLock<Engine>> = Arc::new(OnceLock::new());
    let follow_up: Arc<Mutex<Option<composable_fetch_runtime::SubmissionHandle>>> =
        Arc::new(Mutex::new(None));

    let engine_cell = Arc::clone(&cell);
    let slot = Arc::clone(&follow_up);
    let config = FetchConfig::json(|n| FetchRequest::get(format!("/n/{n}"))).on_success(
        move |payload: &Payload, _, _| {
            if payload.v == 1 {
                let engine = engine_cell.get().expect("engine registered");
                *slot.lock().unwrap() = Some(engine.submit(2));
            }
        },
    );
    let dyn_transport: Arc<dyn Transport> = transport.clone();
    let engine: Engine = FetchEngine::new(config, dyn_transport);
    assert!(cell.set(engine.clone()).is_ok());
    let _mounted = engine.attach();

    engine.submit(1).wait().await;
    let second = follow_up.lock().unwrap().take().expect("follow-up submitted");
    assert_eq!(second.wait().await, SubmissionOutcome::Succeeded);

    assert_eq!(engine.state().result(), Some(&Payload { v: 2 }));
}

#[tokio::test]
async fn subscribers_see_publications() {
    let h = harness();
    let _mounted = h.engine.attach();
    let mut rx = h.engine.subscribe();
    let pending = h.transport.defer("/n/1");

    let handle = h.engine.submit(1);
    assert!(rx.borrow_and_update().is_loading());

    pending.json(StatusCode::OK, json!({"v": 1}));
    rx.changed().await.unwrap();
    assert!(rx.borrow().is_success());
    handle.wait().await;
}

#[tokio::test]
async fn wait_with_timeout_reports_slow_submissions() {
    let h = harness();
    let _mounted = h.engine.attach();
    let _pending = h.transport.defer("/n/1");

    let handle = h.engine.submit(1);
    let id = handle.id();
    let result = handle.wait_with_timeout(Duration::from_millis(20)).await;

    assert_eq!(result, Err(EngineError::Timeout(id)));
    assert!(h.engine.state().is_loading());
}

#[tokio::test]
async fn panicking_projector_resets_to_idle() {
    let transport = Arc::new(MockTransport::new());
    transport.json("/boom", StatusCode::OK, json!({}));
    let config: FetchConfig<(), u32, ()> = FetchConfig::new(
        |()| FetchRequest::get("/boom"),
        |_| panic!("projector bug"),
        |_| Ok(()),
    );
    let dyn_transport: Arc<dyn Transport> = transport.clone();
    let engine = FetchEngine::new(config, dyn_transport);
    let _mounted = engine.attach();

    let outcome = engine.submit(()).wait().await;

    assert_eq!(outcome, SubmissionOutcome::Superseded);
    assert!(engine.state().is_idle());
    assert!(!engine.is_in_flight());
}

#[test]
fn submissions_run_on_a_plain_runtime() {
    let transport = Arc::new(MockTransport::new());
    transport.json("/n/1", StatusCode::OK, json!({"v": 1}));
    let calls = Arc::new(Calls::default());
    let dyn_transport: Arc<dyn Transport> = transport.clone();
    let engine = FetchEngine::new(config(&calls), dyn_transport);

    let outcome = tokio_test::block_on(async {
        let _mounted = engine.attach();
        engine.submit(1).wait().await
    });

    assert_eq!(outcome, SubmissionOutcome::Succeeded);
    assert_eq!(calls.successes(), [1]);
}

#[tokio::test]
async fn burst_of_submissions_settles_only_the_last() {
    let h = harness();
    let _mounted = h.engine.attach();
    for n in 1..=5 {
        h.transport.json(format!("/n/{n}"), StatusCode::OK, json!({"v": n}));
    }

    let handles: Vec<_> = (1..=5).map(|n| h.engine.submit(n)).collect();
    let outcomes =
        futures::future::join_all(handles.into_iter().map(|handle| handle.wait())).await;

    assert_eq!(
        outcomes,
        [
            SubmissionOutcome::Cancelled,
            SubmissionOutcome::Cancelled,
            SubmissionOutcome::Cancelled,
            SubmissionOutcome::Cancelled,
            SubmissionOutcome::Succeeded,
        ]
    );
    assert_eq!(h.calls.successes(), [5]);
    assert_eq!(
        h.recorder.labels(),
        ["loading", "idle", "loading", "idle", "loading", "idle", "loading", "idle", "loading", "success"]
    );
}

// ============================================================================
// Observers
// ============================================================================

fn observed_engine(
    calls: &Arc<Calls>,
    transport: &Arc<MockTransport>,
    observe: impl Fn(&Engine, &FetchState<Payload, Problem>) + Send + Sync + 'static,
) -> Engine {
    let cell: Arc<OnceLock<Engine>> = Arc::new(OnceLock::new());
    let engine_cell = Arc::clone(&cell);
    let dyn_transport: Arc<dyn Transport> = transport.clone();
    let engine = FetchEngine::builder(config(calls), dyn_transport)
        .observer(move |state: &FetchState<Payload, Problem>| {
            if let Some(engine) = engine_cell.get() {
                observe(engine, state);
            }
        })
        .build();
    assert!(cell.set(engine.clone()).is_ok());
    engine
}

#[tokio::test]
async fn observers_may_read_the_engine() {
    let transport = Arc::new(MockTransport::new());
    let pending = transport.defer("/n/1");
    let calls = Arc::new(Calls::default());
    let seen: Arc<Mutex<Vec<(&'static str, bool)>>> = Arc::new(Mutex::new(Vec::new()));

    let record = Arc::clone(&seen);
    let engine = observed_engine(&calls, &transport, move |engine, state| {
        record
            .lock()
            .unwrap()
            .push((state.label(), engine.is_in_flight()));
    });
    let _mounted = engine.attach();

    let handle = engine.submit(1);
    assert!(pending.json(StatusCode::OK, json!({"v": 1})));
    handle.wait().await;

    assert_eq!(*seen.lock().unwrap(), [("loading", true), ("success", false)]);
}

#[tokio::test]
async fn observer_abort_is_delivered_in_order() {
    let transport = Arc::new(MockTransport::new());
    let _pending = transport.defer("/n/1");
    let calls = Arc::new(Calls::default());
    let labels: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let record = Arc::clone(&labels);
    let engine = observed_engine(&calls, &transport, move |engine, state| {
        record.lock().unwrap().push(state.label());
        if state.is_loading() {
            engine.abort();
        }
    });
    let _mounted = engine.attach();

    let handle = engine.submit(1);

    assert_eq!(*labels.lock().unwrap(), ["loading", "idle"]);
    assert!(engine.state().is_idle());
    assert_eq!(handle.wait().await, SubmissionOutcome::Cancelled);
}

#[tokio::test]
async fn detach_from_observer_suppresses_callbacks() {
    let transport = Arc::new(MockTransport::new());
    transport.json("/n/1", StatusCode::OK, json!({"v": 1}));
    let calls = Arc::new(Calls::default());

    let engine = observed_engine(&calls, &transport, |engine, state| {
        if state.is_success() {
            engine.on_detach();
        }
    });
    let mounted = engine.attach();

    assert_eq!(engine.submit(1).wait().await, SubmissionOutcome::Succeeded);

    assert!(!engine.is_mounted());
    assert!(engine.state().is_success());
    assert!(calls.successes().is_empty());
    drop(mounted);
}

//! # Composable Fetch Testing
//!
//! Testing utilities and helpers for the Composable Fetch request engine.
//!
//! This crate provides:
//! - [`MockTransport`]: scripted, deterministic transport with hand-resolved
//!   replies
//! - [`StateRecorder`]: captures every published state in order
//! - [`ReducerTest`]: Given-When-Then assertions for the state machine
//! - [`properties`]: proptest strategies for engine operations
//!
//! ## Example
//!
//! ```ignore
//! use composable_fetch_testing::{MockTransport, StateRecorder};
//!
//! #[tokio::test]
//! async fn loads_a_user() {
//!     let transport = Arc::new(MockTransport::new());
//!     transport.json("/users/1", StatusCode::OK, json!({"name": "Ada"}));
//!     let recorder = StateRecorder::new();
//!
//!     let engine = FetchEngine::builder(config(), transport.clone())
//!         .observer(recorder.observer())
//!         .build();
//!     let _mounted = engine.attach();
//!
//!     engine.submit(1).wait().await;
//!     assert_eq!(recorder.labels(), ["loading", "success"]);
//! }
//! ```

pub mod mocks;

/// Test helpers and utilities
pub mod helpers {
    use tracing_subscriber::EnvFilter;

    /// Install a test-friendly tracing subscriber.
    ///
    /// Honours `RUST_LOG` and defaults to `debug` for the fetch crates.
    /// Output is captured by the test harness. Safe to call from every test:
    /// only the first call installs anything.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                    EnvFilter::new("composable_fetch_runtime=debug,composable_fetch_core=debug")
                }),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// One host-side operation on an engine
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum EngineOp {
        /// `submit` with the given argument
        Submit(u8),
        /// `abort`
        Abort,
        /// Let in-flight work make progress
        Yield,
    }

    /// Strategy for a single [`EngineOp`]
    pub fn engine_op() -> impl Strategy<Value = EngineOp> {
        prop_oneof![
            3 => any::<u8>().prop_map(EngineOp::Submit),
            1 => Just(EngineOp::Abort),
            2 => Just(EngineOp::Yield),
        ]
    }

    /// Strategy for a sequence of up to `max` operations
    pub fn engine_ops(max: usize) -> impl Strategy<Value = Vec<EngineOp>> {
        prop::collection::vec(engine_op(), 0..max)
    }
}

pub use helpers::init_test_tracing;
pub use mocks::{DeferredReply, MockTransport, StateRecorder};
pub use reducer_test::ReducerTest;

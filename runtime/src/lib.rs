//! # Composable Fetch Runtime
//!
//! Runtime for the Composable Fetch request engine.
//!
//! This crate drives the pure state machine from `composable-fetch-core`:
//! it owns the state, runs submissions on Tokio tasks, cancels superseded
//! work and gates publication on the host's lifecycle.
//!
//! ## Core Components
//!
//! - **`FetchEngine`**: Single-flight execution controller (`submit`, `abort`)
//! - **`LifecycleGuard`**: Drops publications while the host is not attached
//! - **`SubmissionToken`**: Per-submission cancellation signal and identity
//! - **`ReqwestTransport`**: Production HTTP transport
//! - **`metrics`**: Prometheus counters and histograms for submissions
//!
//! ## Example
//!
//! ```ignore
//! use composable_fetch_core::{FetchConfig, FetchRequest};
//! use composable_fetch_runtime::{FetchEngine, ReqwestTransport};
//! use std::sync::Arc;
//!
//! let config = FetchConfig::<String, Quote, ApiError>::json(|symbol| {
//!     FetchRequest::get(format!("https://api.example.com/quotes/{symbol}"))
//! });
//! let engine = FetchEngine::new(config, Arc::new(ReqwestTransport::new()?));
//!
//! let _mounted = engine.attach();
//! engine.submit("AAPL".into()).wait().await;
//!
//! let price = engine.with_state(|s| s.result().map(|q| q.price));
//! ```

pub mod engine;
pub mod guard;
pub mod latest;
pub mod metrics;
pub mod observer;
pub mod options;
pub mod token;
pub mod transport;

pub use engine::{
    FetchEngine, FetchEngineBuilder, MountGuard, SubmissionHandle, SubmissionOutcome,
    create_request_engine,
};
pub use guard::{LifecycleGuard, LifecyclePhase};
pub use latest::LatestConfig;
pub use observer::StateObserver;
pub use options::EngineOptions;
pub use token::{SubmissionId, SubmissionToken};
pub use transport::{ReqwestTransport, TransportBuildError, TransportConfig};

/// Error types for the engine runtime
pub mod error {
    use crate::token::SubmissionId;
    use thiserror::Error;

    /// Errors returned by engine operations.
    ///
    /// Submissions themselves never fail: their outcome is reported through
    /// state and callbacks. These errors only concern waiting on them.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum EngineError {
        /// Timed out waiting for a submission to finish
        ///
        /// The submission keeps running and still publishes its outcome.
        #[error("Timed out waiting for submission {0}")]
        Timeout(SubmissionId),
    }
}

pub use error::EngineError;

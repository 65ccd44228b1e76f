//! Prometheus metrics for fetch engines.
//!
//! Engines record through [`FetchMetrics`] whenever
//! [`EngineOptions::record_metrics`](crate::EngineOptions::record_metrics) is
//! set. Nothing is exported until a recorder is installed, for example with
//! [`MetricsServer::start`].
//!
//! | Metric | Kind | Labels |
//! |---|---|---|
//! | `fetch_submissions_total` | counter | `engine` |
//! | `fetch_cancellations_total` | counter | `engine` |
//! | `fetch_settlements_total` | counter | `engine`, `outcome` |
//! | `fetch_discarded_total` | counter | `engine` |
//! | `fetch_request_duration_seconds` | histogram | `engine`, `outcome` |
//!
//! # Example
//!
//! ```rust,no_run
//! use composable_fetch_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder with a render handle.
///
/// `addr` is where the host intends to serve the text returned by
/// [`render`](Self::render); the engine itself does not listen on it.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a metrics server for `addr`
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Describe the fetch metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the histogram buckets are rejected
    /// and [`MetricsError::Install`] if the recorder cannot be installed for a
    /// reason other than one already being present.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    // Another server (or a test) owns the global recorder
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Address the host serves metrics on
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Handle to the installed recorder, if this server installed it
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "fetch_submissions_total",
        "Total number of submissions started"
    );
    describe_counter!(
        "fetch_cancellations_total",
        "Submissions cancelled by a newer submission, abort or detach"
    );
    describe_counter!(
        "fetch_settlements_total",
        "Settlements applied to engine state, by outcome"
    );
    describe_counter!(
        "fetch_discarded_total",
        "Settlements that arrived after their submission stopped being current"
    );
    describe_histogram!(
        "fetch_request_duration_seconds",
        "Time from submission to settlement"
    );
}

/// Fetch engine metrics recorder.
pub struct FetchMetrics;

impl FetchMetrics {
    /// Record a submission start.
    pub fn record_submission(engine: &str) {
        counter!("fetch_submissions_total", "engine" => engine.to_string()).increment(1);
    }

    /// Record a cancellation of the current submission.
    pub fn record_cancellation(engine: &str) {
        counter!("fetch_cancellations_total", "engine" => engine.to_string()).increment(1);
    }

    /// Record an applied settlement.
    pub fn record_settlement(engine: &str, outcome: &'static str, duration: Duration) {
        counter!(
            "fetch_settlements_total",
            "engine" => engine.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!(
            "fetch_request_duration_seconds",
            "engine" => engine.to_string(),
            "outcome" => outcome
        )
        .record(duration.as_secs_f64());
    }

    /// Record a settlement dropped by the identity check.
    pub fn record_discarded(engine: &str) {
        counter!("fetch_discarded_total", "engine" => engine.to_string()).increment(1);
    }
}

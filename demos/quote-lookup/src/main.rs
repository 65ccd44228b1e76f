//! Quote lookup demo
//!
//! Looks up quotes over HTTP with a single-flight engine: rapid lookups
//! supersede each other, and only the last one reaches the screen. Then
//! posts a form with the URL-encoded preset.
//!
//! Environment:
//! - `QUOTE_API_URL`: base URL of the quote API (default `https://dummyjson.com/`)
//! - `FORM_ECHO_URL`: endpoint that echoes posted forms (default `https://httpbin.org/post`)
//! - `RUST_LOG`: tracing filter

use anyhow::Context;
use composable_fetch_core::presets::{FormData, init_form_post};
use composable_fetch_core::{FetchConfig, FetchRequest, FetchState};
use composable_fetch_runtime::metrics::MetricsServer;
use composable_fetch_runtime::{
    EngineOptions, FetchEngine, ReqwestTransport, TransportConfig, create_request_engine,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Deserialize)]
struct Quote {
    id: u32,
    quote: String,
    author: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct FormEcho {
    form: HashMap<String, String>,
}

fn render(state: &FetchState<Quote, ApiError>) -> String {
    match state {
        FetchState::Idle => "idle".to_string(),
        FetchState::Loading => "loading...".to_string(),
        FetchState::Success { result, .. } => {
            format!("#{} \"{}\" ({})", result.id, result.quote, result.author)
        },
        FetchState::Failed {
            status,
            error_result,
            ..
        } => format!("{status}: {}", error_result.message),
        FetchState::Exception { cause, .. } => format!("exception: {cause}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quote_lookup=info,composable_fetch_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut metrics = MetricsServer::new("127.0.0.1:9090".parse()?);
    metrics.start()?;

    let base_url =
        std::env::var("QUOTE_API_URL").unwrap_or_else(|_| "https://dummyjson.com/".to_string());
    let transport = Arc::new(
        ReqwestTransport::with_config(
            TransportConfig::default()
                .with_base_url(base_url)
                .with_timeout(Duration::from_secs(10)),
        )
        .context("building HTTP transport")?,
    );

    println!("=== Quote Lookup: Composable Fetch ===\n");

    let config = FetchConfig::<u32, Quote, ApiError>::json(|id| {
        FetchRequest::get(format!("quotes/{id}"))
    })
    .on_success(|quote, status, _| tracing::info!(id = quote.id, %status, "Quote loaded"))
    .on_error(|error, status, _| tracing::warn!(%status, message = %error.message, "Lookup rejected"))
    .on_exception(|cause| tracing::error!(error = %cause, "Lookup failed"));

    let quotes = FetchEngine::builder(config, transport.clone())
        .initial_args(1)
        .options(EngineOptions::default().with_name("quotes"))
        .observer(|state: &FetchState<Quote, ApiError>| println!("  [quotes] {}", render(state)))
        .build();

    // Attaching runs the initial lookup
    println!(">>> Attach (initial lookup of #1)");
    let mounted = quotes.attach();
    let mut updates = quotes.subscribe();
    while quotes.with_state(FetchState::is_loading) {
        updates.changed().await?;
    }

    // Rapid lookups: each one cancels the one before it
    println!("\n>>> Rapid lookups #2, #3, #4");
    let _ = quotes.submit(2);
    let _ = quotes.submit(3);
    let last = quotes.submit(4);
    println!("  outcome of #4: {:?}", last.wait().await);

    println!("\n>>> Lookup of a missing quote");
    println!("  outcome: {:?}", quotes.submit(100_000).wait().await);

    println!("\n>>> Lookup then abort");
    let aborted = quotes.submit(5);
    quotes.abort();
    println!("  outcome: {:?}", aborted.wait().await);

    drop(mounted);
    println!("\n>>> Detached; further lookups are not rendered");
    let _ = quotes.submit(6).wait().await;

    // Form post with the URL-encoded preset
    let echo_url =
        std::env::var("FORM_ECHO_URL").unwrap_or_else(|_| "https://httpbin.org/post".to_string());
    let form_config = FetchConfig::<FormData, FormEcho, serde_json::Value>::json(move |form| {
        FetchRequest::new(echo_url.clone(), init_form_post(form.clone()))
    });
    let forms = create_request_engine(form_config, transport, None);
    let _forms_mounted = forms.attach();

    println!("\n>>> Posting a form");
    let form = FormData::new()
        .text("author", "Ada Lovelace")
        .text("note", "1 + 1 = 2 & more");
    forms.submit(form).wait().await;
    match forms.state() {
        FetchState::Success { result, .. } => println!("  server saw: {:?}", result.form),
        other => println!("  {}", other.label()),
    }

    if let Some(rendered) = metrics.render() {
        println!("\n=== Metrics ===\n{rendered}");
    }

    Ok(())
}

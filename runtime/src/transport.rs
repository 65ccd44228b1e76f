//! HTTP transport built on `reqwest`.

use composable_fetch_core::presets::FormValue;
use composable_fetch_core::{
    Credentials, FetchError, FetchRequest, FetchResponse, FormData, RequestBody, Transport,
    TransportFuture,
};
use http::header::{CONTENT_TYPE, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Url};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors building a [`ReqwestTransport`].
#[derive(Error, Debug)]
pub enum TransportBuildError {
    /// The base URL does not parse
    #[error("Invalid base URL {url}: {reason}")]
    InvalidBaseUrl {
        /// The rejected URL
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// The underlying HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Configuration for [`ReqwestTransport`].
///
/// # Example
///
/// ```
/// use composable_fetch_runtime::TransportConfig;
/// use std::time::Duration;
///
/// let config = TransportConfig::default()
///     .with_base_url("https://api.example.com")
///     .with_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.base_url.as_deref(), Some("https://api.example.com"));
/// ```
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base URL that relative resources are resolved against
    pub base_url: Option<String>,
    /// Per-request timeout
    pub timeout: Option<Duration>,
    /// `User-Agent` header value
    pub user_agent: String,
}

impl TransportConfig {
    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the per-request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disable the per-request timeout
    #[must_use]
    pub const fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Set the user agent
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Some(Duration::from_secs(30)),
            user_agent: concat!("composable-fetch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// [`Transport`] over HTTP.
///
/// Credentials map onto two clients: one with a cookie store, used for
/// [`Credentials::Include`] and [`Credentials::SameOrigin`], and one
/// without, used for [`Credentials::Omit`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    with_cookies: Client,
    anonymous: Client,
    base_url: Option<Url>,
}

impl ReqwestTransport {
    /// Transport with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TransportBuildError::Client`] if the TLS backend cannot be
    /// initialised.
    pub fn new() -> Result<Self, TransportBuildError> {
        Self::with_config(TransportConfig::default())
    }

    /// Transport with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TransportBuildError::InvalidBaseUrl`] if `base_url` does not
    /// parse, or [`TransportBuildError::Client`] if a client cannot be built.
    pub fn with_config(config: TransportConfig) -> Result<Self, TransportBuildError> {
        let base_url = config
            .base_url
            .as_deref()
            .map(|url| {
                Url::parse(url).map_err(|e| TransportBuildError::InvalidBaseUrl {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let client = |cookies: bool| {
            let mut builder = Client::builder()
                .user_agent(config.user_agent.clone())
                .cookie_store(cookies);
            if let Some(timeout) = config.timeout {
                builder = builder.timeout(timeout);
            }
            builder.build()
        };

        Ok(Self {
            with_cookies: client(true)?,
            anonymous: client(false)?,
            base_url,
        })
    }

    fn resolve(&self, resource: &str) -> Result<Url, FetchError> {
        let resolved = match &self.base_url {
            Some(base) => base.join(resource),
            None => Url::parse(resource),
        };
        resolved.map_err(|e| FetchError::InvalidRequest(format!("{resource}: {e}")))
    }

    fn build(&self, request: FetchRequest) -> Result<RequestBuilder, FetchError> {
        let url = self.resolve(&request.resource)?;
        let init = request.init;
        let client = match init.credentials {
            Credentials::Omit => &self.anonymous,
            Credentials::SameOrigin | Credentials::Include => &self.with_cookies,
        };

        let builder = client.request(init.method, url).headers(init.headers);
        Ok(match init.body {
            None => builder,
            Some(RequestBody::Text(text) | RequestBody::UrlEncoded(text)) => builder.body(text),
            Some(RequestBody::Json(value)) => builder
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(value.to_string()),
            Some(RequestBody::Multipart(form)) => builder.multipart(multipart(form)?),
        })
    }

    async fn execute(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let response = self.build(request)?.send().await.map_err(map_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(map_error)?;

        tracing::trace!(status = %status, bytes = body.len(), "Received response");
        Ok(FetchResponse::new(status, headers, body))
    }
}

impl Transport for ReqwestTransport {
    fn fetch(&self, request: FetchRequest, cancel: CancellationToken) -> TransportFuture<'_> {
        Box::pin(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => Err(FetchError::Cancelled),
                result = self.execute(request) => result,
            }
        })
    }
}

fn multipart(form: FormData) -> Result<Form, FetchError> {
    form.entries()
        .iter()
        .try_fold(Form::new(), |multipart, (name, value)| match value {
            FormValue::Text(text) => Ok(multipart.text(name.clone(), text.clone())),
            FormValue::File(file) => {
                let mut part = Part::bytes(file.bytes.to_vec()).file_name(file.file_name.clone());
                if let Some(content_type) = &file.content_type {
                    part = part
                        .mime_str(content_type)
                        .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
                }
                Ok(multipart.part(name.clone(), part))
            },
        })
}

fn map_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else if error.is_builder() {
        FetchError::InvalidRequest(error.to_string())
    } else {
        FetchError::Network(error.to_string())
    }
}

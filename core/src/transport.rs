//! Transport contract consumed by the fetch engine.
//!
//! The engine never performs I/O itself. It hands a [`FetchRequest`] and a
//! cancellation token to a [`Transport`] and awaits a [`FetchResponse`].
//!
//! # Implementations
//!
//! - `ReqwestTransport` (in `composable-fetch-runtime`): production HTTP client
//! - `MockTransport` (in `composable-fetch-testing`): scripted, deterministic tests

use crate::error::FetchError;
use crate::presets::FormData;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Boxed future returned by [`Transport::fetch`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<FetchResponse, FetchError>> + Send + 'a>>;

/// Whether ambient credentials (cookies, auth) accompany a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Credentials {
    /// Never send credentials
    Omit,
    /// Send credentials only to the origin that issued them
    #[default]
    SameOrigin,
    /// Always send credentials
    Include,
}

/// Request body variants understood by transports.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Plain text body, sent as-is
    Text(String),
    /// `application/x-www-form-urlencoded` body, already encoded
    UrlEncoded(String),
    /// `multipart/form-data` body; the transport chooses the boundary
    Multipart(FormData),
    /// JSON body
    Json(serde_json::Value),
}

/// Options for a single transport call: method, credentials mode, headers and
/// optional body.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestInit {
    /// HTTP method
    pub method: Method,
    /// Credentials mode
    pub credentials: Credentials,
    /// Request headers
    pub headers: HeaderMap,
    /// Optional body
    pub body: Option<RequestBody>,
}

impl RequestInit {
    /// Create options for `method` with no headers and no body.
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            method,
            credentials: Credentials::default(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Set the credentials mode
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Insert a header, replacing any previous value
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }
}

impl Default for RequestInit {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}

/// A resource plus the options to fetch it with.
///
/// This is what a request descriptor (`FetchConfig::prepare`) produces.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// Absolute URL, or a path resolved against the transport's base URL
    pub resource: String,
    /// Options for the call
    pub init: RequestInit,
}

impl FetchRequest {
    /// Create a request for `resource` with the given options
    #[must_use]
    pub fn new(resource: impl Into<String>, init: RequestInit) -> Self {
        Self {
            resource: resource.into(),
            init,
        }
    }

    /// A GET request using [`default_get_init`](crate::presets::default_get_init)
    #[must_use]
    pub fn get(resource: impl Into<String>) -> Self {
        Self::new(resource, crate::presets::default_get_init())
    }
}

/// A response as returned by a transport: status, headers and raw body.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Undecoded body
    pub body: Bytes,
}

impl FetchResponse {
    /// Create a response
    #[must_use]
    pub const fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Convenience constructor for a JSON response with no headers
    #[must_use]
    pub fn json_body(status: StatusCode, body: &serde_json::Value) -> Self {
        Self::new(status, HeaderMap::new(), Bytes::from(body.to_string()))
    }

    /// Whether the status is in the 2xx range
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Decode`] if the body is not valid JSON (an empty
    /// body included).
    pub fn json(&self) -> Result<serde_json::Value, FetchError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// The transport primitive: performs one request and resolves with the
/// response.
///
/// Implementations should honour `cancel` by returning
/// [`FetchError::Cancelled`] promptly once it fires. The engine races every
/// call against the same token and discards late results, so a transport that
/// ignores cancellation is still safe, just wasteful.
///
/// # Dyn Compatibility
///
/// Uses an explicit `Pin<Box<dyn Future>>` return so the engine can hold an
/// `Arc<dyn Transport>`.
pub trait Transport: Send + Sync {
    /// Perform `request`.
    ///
    /// # Errors
    ///
    /// Any [`FetchError`]; [`FetchError::Cancelled`] when `cancel` fired.
    fn fetch(&self, request: FetchRequest, cancel: CancellationToken) -> TransportFuture<'_>;
}

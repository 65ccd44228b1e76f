//! Execution configuration: request descriptor, projectors and callbacks.
//!
//! A [`FetchConfig`] is supplied per render by the host and replaced as a
//! whole. The engine reads the latest one at submission time, so a
//! submission always runs with the configuration that was current when it
//! was issued.

use crate::error::FetchError;
use crate::transport::FetchRequest;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

/// Request descriptor: call-site arguments to a transport request
pub type PrepareFn<A> = Arc<dyn Fn(&A) -> FetchRequest + Send + Sync>;

/// Projector: decoded body to a typed value
pub type ProjectFn<T> = Arc<dyn Fn(serde_json::Value) -> Result<T, FetchError> + Send + Sync>;

/// Callback invoked after a success state is published
pub type SuccessCallback<R> = Arc<dyn Fn(&R, StatusCode, &HeaderMap) + Send + Sync>;

/// Callback invoked after an error-response state is published
pub type ErrorCallback<E> = Arc<dyn Fn(&E, StatusCode, &HeaderMap) + Send + Sync>;

/// Callback invoked after an exception state is published
pub type ExceptionCallback = Arc<dyn Fn(&FetchError) + Send + Sync>;

/// Descriptor, projectors and optional outcome callbacks for one engine.
///
/// # Type Parameters
///
/// - `A`: Arguments passed to `submit`
/// - `R`: Success result type
/// - `E`: Error-response result type
///
/// # Example
///
/// ```
/// use composable_fetch_core::config::FetchConfig;
/// use composable_fetch_core::transport::FetchRequest;
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize)]
/// struct User { name: String }
///
/// #[derive(Debug, Deserialize)]
/// struct ApiError { message: String }
///
/// let config = FetchConfig::<u64, User, ApiError>::json(|id| {
///     FetchRequest::get(format!("/users/{id}"))
/// })
/// .on_success(|user, _status, _headers| println!("loaded {}", user.name));
///
/// assert_eq!(config.prepare(&7).resource, "/users/7");
/// ```
pub struct FetchConfig<A, R, E> {
    prepare: PrepareFn<A>,
    get_result: ProjectFn<R>,
    get_error: ProjectFn<E>,
    on_success: Option<SuccessCallback<R>>,
    on_error: Option<ErrorCallback<E>>,
    on_exception: Option<ExceptionCallback>,
}

impl<A, R, E> FetchConfig<A, R, E> {
    /// Create a configuration from a descriptor and two projectors.
    pub fn new<P, GR, GE>(prepare: P, get_result: GR, get_error: GE) -> Self
    where
        P: Fn(&A) -> FetchRequest + Send + Sync + 'static,
        GR: Fn(serde_json::Value) -> Result<R, FetchError> + Send + Sync + 'static,
        GE: Fn(serde_json::Value) -> Result<E, FetchError> + Send + Sync + 'static,
    {
        Self {
            prepare: Arc::new(prepare),
            get_result: Arc::new(get_result),
            get_error: Arc::new(get_error),
            on_success: None,
            on_error: None,
            on_exception: None,
        }
    }

    /// Set the success callback
    #[must_use]
    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&R, StatusCode, &HeaderMap) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    /// Set the error-response callback
    #[must_use]
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&E, StatusCode, &HeaderMap) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Set the exception callback
    #[must_use]
    pub fn on_exception<F>(mut self, callback: F) -> Self
    where
        F: Fn(&FetchError) + Send + Sync + 'static,
    {
        self.on_exception = Some(Arc::new(callback));
        self
    }

    /// Run the request descriptor
    #[must_use]
    pub fn prepare(&self, args: &A) -> FetchRequest {
        (self.prepare)(args)
    }

    /// Project a decoded success body.
    ///
    /// # Errors
    ///
    /// Whatever the result projector rejects the body with.
    pub fn project_result(&self, body: serde_json::Value) -> Result<R, FetchError> {
        (self.get_result)(body)
    }

    /// Project a decoded error body.
    ///
    /// # Errors
    ///
    /// Whatever the error projector rejects the body with.
    pub fn project_error(&self, body: serde_json::Value) -> Result<E, FetchError> {
        (self.get_error)(body)
    }

    /// The success callback, if configured
    #[must_use]
    pub fn success_callback(&self) -> Option<&SuccessCallback<R>> {
        self.on_success.as_ref()
    }

    /// The error-response callback, if configured
    #[must_use]
    pub fn error_callback(&self) -> Option<&ErrorCallback<E>> {
        self.on_error.as_ref()
    }

    /// The exception callback, if configured
    #[must_use]
    pub fn exception_callback(&self) -> Option<&ExceptionCallback> {
        self.on_exception.as_ref()
    }
}

impl<A, R, E> FetchConfig<A, R, E>
where
    R: DeserializeOwned + 'static,
    E: DeserializeOwned + 'static,
{
    /// Configuration whose projectors deserialize the body with serde.
    ///
    /// A body that does not match the target type surfaces as
    /// [`FetchError::Projection`].
    pub fn json<P>(prepare: P) -> Self
    where
        P: Fn(&A) -> FetchRequest + Send + Sync + 'static,
    {
        Self::new(prepare, deserialize_body::<R>, deserialize_body::<E>)
    }
}

fn deserialize_body<T: DeserializeOwned>(body: serde_json::Value) -> Result<T, FetchError> {
    serde_json::from_value(body).map_err(|e| FetchError::Projection(e.to_string()))
}

impl<A, R, E> Clone for FetchConfig<A, R, E> {
    fn clone(&self) -> Self {
        Self {
            prepare: Arc::clone(&self.prepare),
            get_result: Arc::clone(&self.get_result),
            get_error: Arc::clone(&self.get_error),
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            on_exception: self.on_exception.clone(),
        }
    }
}

impl<A, R, E> fmt::Debug for FetchConfig<A, R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchConfig")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_exception", &self.on_exception.is_some())
            .finish_non_exhaustive()
    }
}

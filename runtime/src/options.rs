//! Engine-level options.

use std::borrow::Cow;

/// Options for a [`FetchEngine`](crate::FetchEngine).
///
/// # Example
///
/// ```
/// use composable_fetch_runtime::EngineOptions;
///
/// let options = EngineOptions::default()
///     .with_name("quotes")
///     .with_exception_logging(false);
///
/// assert_eq!(options.name, "quotes");
/// ```
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Name used as the `engine` field in logs and the `engine` label in
    /// metrics
    pub name: Cow<'static, str>,
    /// Log transport exceptions at `warn`
    pub log_exceptions: bool,
    /// Record `fetch_*` metrics
    pub record_metrics: bool,
}

impl EngineOptions {
    /// Set the engine name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Enable or disable exception logging
    #[must_use]
    pub const fn with_exception_logging(mut self, enabled: bool) -> Self {
        self.log_exceptions = enabled;
        self
    }

    /// Enable or disable metrics
    #[must_use]
    pub const fn with_metrics(mut self, enabled: bool) -> Self {
        self.record_metrics = enabled;
        self
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            name: Cow::Borrowed("fetch"),
            log_exceptions: true,
            record_metrics: true,
        }
    }
}

//! Default request option presets and form encoding.
//!
//! These are data, not behaviour: every function returns a fresh
//! [`RequestInit`] that a request descriptor can tweak before handing it to
//! the engine.
//!
//! # Example
//!
//! ```
//! use composable_fetch_core::presets::{init_form_post, FormData};
//! use composable_fetch_core::transport::RequestBody;
//!
//! let form = FormData::new()
//!     .text("name", "Ada Lovelace")
//!     .text("lang", "en&fr");
//!
//! let init = init_form_post(form);
//! assert_eq!(
//!     init.body,
//!     Some(RequestBody::UrlEncoded("name=Ada%20Lovelace&lang=en%26fr".into()))
//! );
//! ```

use crate::error::FetchError;
use crate::transport::{Credentials, RequestBody, RequestInit};
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use http::Method;

/// `Accept` value sent by every preset
pub const ACCEPT_JSON: &str = "application/json";

/// `Content-Type` of URL-encoded form posts
pub const FORM_URL_ENCODED: &str = "application/x-www-form-urlencoded";

/// GET, credentials included, JSON accept header.
#[must_use]
pub fn default_get_init() -> RequestInit {
    RequestInit::new(Method::GET)
        .with_credentials(Credentials::Include)
        .with_header(ACCEPT, HeaderValue::from_static(ACCEPT_JSON))
}

/// POST with a URL-encoded body, credentials included, JSON accept header.
#[must_use]
pub fn default_post_init() -> RequestInit {
    RequestInit::new(Method::POST)
        .with_credentials(Credentials::Include)
        .with_header(ACCEPT, HeaderValue::from_static(ACCEPT_JSON))
        .with_header(CONTENT_TYPE, HeaderValue::from_static(FORM_URL_ENCODED))
}

/// POST for multipart bodies. No `Content-Type`: the transport sets it along
/// with the boundary.
#[must_use]
pub fn default_form_data_post_init() -> RequestInit {
    RequestInit::new(Method::POST)
        .with_credentials(Credentials::Include)
        .with_header(ACCEPT, HeaderValue::from_static(ACCEPT_JSON))
}

/// Build POST options for a submitted form.
///
/// If any field is a file the form goes out as multipart
/// ([`default_form_data_post_init`]). Otherwise it is URL-encoded
/// ([`default_post_init`]) with keys and values percent-encoded.
#[must_use]
pub fn init_form_post(form: FormData) -> RequestInit {
    if form.has_files() {
        default_form_data_post_init().with_body(RequestBody::Multipart(form))
    } else {
        let body = encode_url_encoded(&form);
        default_post_init().with_body(RequestBody::UrlEncoded(body))
    }
}

/// Percent-encode the text fields of `form` as `k=v&k=v`.
///
/// File fields are skipped; use [`init_form_post`] to pick multipart for
/// forms that carry files.
#[must_use]
pub fn encode_url_encoded(form: &FormData) -> String {
    form.entries()
        .iter()
        .filter_map(|(key, value)| match value {
            FormValue::Text(text) => Some(format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(text)
            )),
            FormValue::File(_) => None,
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Decode a `k=v&k=v` body back into ordered pairs.
///
/// A segment without `=` decodes to an empty value. `+` is kept literally,
/// matching [`encode_url_encoded`] which never produces it for spaces.
///
/// # Errors
///
/// Returns [`FetchError::Decode`] if a percent escape does not decode to
/// UTF-8.
pub fn parse_url_encoded(body: &str) -> Result<Vec<(String, String)>, FetchError> {
    body.split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
            let key = urlencoding::decode(key).map_err(|e| FetchError::Decode(e.to_string()))?;
            let value =
                urlencoding::decode(value).map_err(|e| FetchError::Decode(e.to_string()))?;
            Ok((key.into_owned(), value.into_owned()))
        })
        .collect()
}

/// A file attached to a form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    /// File name reported to the server
    pub file_name: String,
    /// MIME type, if known
    pub content_type: Option<String>,
    /// File contents
    pub bytes: Bytes,
}

impl FilePart {
    /// Create a file part
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    /// Set the MIME type
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Value of a single form field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    /// Scalar field
    Text(String),
    /// Binary file
    File(FilePart),
}

/// Ordered set of submitted form fields. Keys may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    entries: Vec<(String, FormValue)>,
}

impl FormData {
    /// Empty form
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a text field
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.append(name, FormValue::Text(value.into()));
        self
    }

    /// Append a file field
    #[must_use]
    pub fn file(mut self, name: impl Into<String>, file: FilePart) -> Self {
        self.append(name, FormValue::File(file));
        self
    }

    /// Append a field in place
    pub fn append(&mut self, name: impl Into<String>, value: FormValue) {
        self.entries.push((name.into(), value));
    }

    /// Fields in submission order
    #[must_use]
    pub fn entries(&self) -> &[(String, FormValue)] {
        &self.entries
    }

    /// Whether any field is a file
    #[must_use]
    pub fn has_files(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, value)| matches!(value, FormValue::File(_)))
    }

    /// Number of fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the form has no fields
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for FormData
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), FormValue::Text(v.into())))
                .collect(),
        }
    }
}

//! Wire-level shapes exchanged with the fetcher.
//!
//! All structs accept unknown fields and keep them in `extra`, so a fetcher
//! can pass transport-specific values through untouched.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::url::DEFAULT_PATH_PARAMS_PATTERN;
use crate::error::SchemaError;

/// Header name to value.
pub type Headers = BTreeMap<String, String>;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    /// `GET`
    #[default]
    Get,
    /// `DELETE`
    Delete,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `PURGE`
    Purge,
    /// `LINK`
    Link,
    /// `UNLINK`
    Unlink,
    /// `TRACE`
    Trace,
    /// `CONNECT`
    Connect,
}

impl RequestMethod {
    /// Upper-case method name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Purge => "PURGE",
            Self::Link => "LINK",
            Self::Unlink => "UNLINK",
            Self::Trace => "TRACE",
            Self::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected shape of the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Raw bytes.
    ArrayBuffer,
    /// Binary large object.
    Blob,
    /// Markup document.
    Document,
    /// JSON; a textual body is decoded before validation.
    #[default]
    Json,
    /// Plain text.
    Text,
    /// Streamed body.
    Stream,
}

/// Header maps must not contain empty names.
pub(crate) fn validate_headers(headers: &Headers, field: &str) -> Result<(), SchemaError> {
    match headers.keys().find(|name| name.is_empty()) {
        Some(_) => Err(SchemaError::at(field, "header names must not be empty")),
        None => Ok(()),
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// A fully assembled request handed to the fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Absolute or base-relative URL with path parameters expanded.
    pub url: String,
    /// HTTP method.
    #[serde(default)]
    pub method: RequestMethod,
    /// Api headers overlaid with per-call option headers.
    #[serde(default)]
    pub headers: Headers,
    /// Validated payload.
    #[serde(default = "empty_object")]
    pub data: Value,
    /// Expected response body shape.
    #[serde(default)]
    pub response_type: ResponseType,
    /// Custom values copied from the api definition.
    #[serde(default)]
    pub custom: Map<String, Value>,
    /// Unrecognised fields, passed through.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Request {
    /// Checks the request shape.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] when the url is empty or a header name is
    /// empty.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.url.is_empty() {
            return Err(SchemaError::at("url", "url must not be empty"));
        }
        validate_headers(&self.headers, "headers")
    }
}

/// A response as returned by the fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// Response body. `null` when absent.
    #[serde(default)]
    pub data: Value,
    /// HTTP status code.
    pub status: u16,
    /// HTTP status text.
    #[serde(default)]
    pub status_text: String,
    /// Response headers.
    #[serde(default)]
    pub headers: Headers,
    /// Raw `Set-Cookie` values.
    #[serde(default)]
    pub cookies: Vec<String>,
    /// Unrecognised fields, passed through.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Response {
    /// Response with the given status and body and nothing else.
    #[must_use]
    pub fn new(status: u16, data: Value) -> Self {
        Self {
            data,
            status,
            status_text: String::new(),
            headers: Headers::new(),
            cookies: Vec::new(),
            extra: Map::new(),
        }
    }

    /// JSON form, as handed to error reports and fetchers.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

const fn default_loading_delay() -> u64 {
    200
}

const fn default_timeout() -> u64 {
    20_000
}

fn default_path_params_pattern() -> String {
    DEFAULT_PATH_PARAMS_PATTERN.to_string()
}

/// Per-call request options.
///
/// `loading*` and `timeout` are hints for the fetcher; the pipeline itself
/// only uses `headers` and `path_params_pattern`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    /// Whether a loading indicator should be shown.
    #[serde(default)]
    pub loading: bool,
    /// Loading indicator text.
    #[serde(default)]
    pub loading_text: String,
    /// Milliseconds before a loading indicator appears. Defaults to 200.
    #[serde(default = "default_loading_delay")]
    pub loading_delay: u64,
    /// Milliseconds before the fetcher should give up. Defaults to 20000.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Headers overriding the api definition's headers.
    #[serde(default)]
    pub headers: Headers,
    /// Regular expression locating path parameters in the url.
    #[serde(default = "default_path_params_pattern")]
    pub path_params_pattern: String,
    /// Caller data. The observer stores the request id under `reqId`.
    #[serde(default)]
    pub custom: Map<String, Value>,
    /// Unrecognised fields, passed through.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RequestOptions {
    /// Parses a raw option map, filling defaults.
    ///
    /// # Errors
    ///
    /// Returns the deserialization error when a known field has the wrong
    /// type, or a header name is empty.
    pub fn parse(raw: &Map<String, Value>) -> Result<Self, crate::error::BoxError> {
        let options: Self = serde_json::from_value(Value::Object(raw.clone()))?;
        validate_headers(&options.headers, "headers")?;
        Ok(options)
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            loading: false,
            loading_text: String::new(),
            loading_delay: default_loading_delay(),
            timeout: default_timeout(),
            headers: Headers::new(),
            path_params_pattern: default_path_params_pattern(),
            custom: Map::new(),
            extra: Map::new(),
        }
    }
}

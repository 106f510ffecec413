//! Error types for event dispatch, the request pipeline and the observer.
//!
//! Every failure is tagged so callers can branch on the variant (or on
//! [`RequestErrorKind`]) instead of matching on message strings.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::observer::RequestStatus;

/// Boxed cause carried by [`RequestError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures raised by [`crate::event::EventChannel`] and
/// [`crate::event::EventPool`].
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The topic was never declared on the pool.
    #[error("unknown event topic: {0}")]
    UnknownTopic(String),

    /// The first error recorded during an emit cycle.
    #[error("listener failed: {0:#}")]
    Listener(anyhow::Error),

    /// Every error recorded during an emit cycle, in invocation order.
    #[error("{} listeners failed", .0.len())]
    Listeners(Vec<anyhow::Error>),
}

impl EventError {
    /// Returns the listener errors carried by this value, in order.
    ///
    /// Empty for [`EventError::UnknownTopic`].
    #[must_use]
    pub fn listener_errors(&self) -> Vec<&anyhow::Error> {
        match self {
            Self::UnknownTopic(_) => Vec::new(),
            Self::Listener(error) => vec![error],
            Self::Listeners(errors) => errors.iter().collect(),
        }
    }
}

/// A value rejected by a [`crate::request::Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    message: String,
    path: Option<String>,
}

impl SchemaError {
    /// Creates an error without a location.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
        }
    }

    /// Creates an error pointing at `path` inside the validated value.
    #[must_use]
    pub fn at(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// Human-readable reason.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Location of the offending value, if known.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "at `{path}`: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for SchemaError {}

/// Phase of the request pipeline that produced a [`RequestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RequestErrorKind {
    /// The api definition (or its headers provider) is malformed.
    #[serde(rename = "ERR_API_VALIDATION")]
    ApiValidation,
    /// The assembled request does not match the request shape.
    #[serde(rename = "ERR_REQUEST_DTO_VALIDATION")]
    RequestDtoValidation,
    /// The outgoing payload failed the api's data schema.
    #[serde(rename = "ERR_REQUEST_DATA_VALIDATION")]
    RequestDataValidation,
    /// The fetcher returned something that is not a response.
    #[serde(rename = "ERR_RESPONSE_DTO_VALIDATION")]
    ResponseDtoValidation,
    /// The response data failed the api's response schema.
    #[serde(rename = "ERR_RESPONSE_DATA_VALIDATION")]
    ResponseDataValidation,
    /// The response data failed the api's response-struct schema.
    #[serde(rename = "ERR_RESPONSE_DATA_STRUCT_VALIDATION")]
    ResponseDataStructValidation,
    /// Decoding a textual response body as JSON failed.
    #[serde(rename = "ERR_RESPONSE_DATA_TRANSFORM")]
    ResponseDataTransform,
    /// The request options are malformed.
    #[serde(rename = "ERR_CONFIG_VALIDATION")]
    ConfigValidation,
    /// The fetcher itself failed.
    #[serde(rename = "ERR_REQUEST_EXECUTOR")]
    RequestExecutor,
}

impl RequestErrorKind {
    /// Stable error code string.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ApiValidation => "ERR_API_VALIDATION",
            Self::RequestDtoValidation => "ERR_REQUEST_DTO_VALIDATION",
            Self::RequestDataValidation => "ERR_REQUEST_DATA_VALIDATION",
            Self::ResponseDtoValidation => "ERR_RESPONSE_DTO_VALIDATION",
            Self::ResponseDataValidation => "ERR_RESPONSE_DATA_VALIDATION",
            Self::ResponseDataStructValidation => "ERR_RESPONSE_DATA_STRUCT_VALIDATION",
            Self::ResponseDataTransform => "ERR_RESPONSE_DATA_TRANSFORM",
            Self::ConfigValidation => "ERR_CONFIG_VALIDATION",
            Self::RequestExecutor => "ERR_REQUEST_EXECUTOR",
        }
    }
}

impl fmt::Display for RequestErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Failure of one request pipeline phase.
///
/// Carries the offending raw data and the underlying cause.
#[derive(Debug, thiserror::Error)]
#[error("{message} ({kind})")]
pub struct RequestError {
    kind: RequestErrorKind,
    message: String,
    data: Value,
    #[source]
    source: BoxError,
}

impl RequestError {
    /// Creates a new error.
    #[must_use]
    pub fn new(
        kind: RequestErrorKind,
        message: impl Into<String>,
        data: Value,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            data,
            source: source.into(),
        }
    }

    /// Phase tag.
    #[must_use]
    pub const fn kind(&self) -> RequestErrorKind {
        self.kind
    }

    /// Short description of the failed phase.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The raw value that was being processed.
    #[must_use]
    pub const fn data(&self) -> &Value {
        &self.data
    }

    /// The underlying cause.
    #[must_use]
    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.source.as_ref()
    }
}

/// Failures returned by [`crate::observer::RequestObserver::send`].
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// `send` was called before an api definition was consumed.
    #[error("no api definition configured for this observer")]
    MissingApiDef,

    /// A pipeline phase failed.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// An interceptor failed, aborting the remaining interceptors of the
    /// phase and the request.
    #[error("{status} interceptor failed: {source}")]
    Interceptor {
        /// Phase whose interceptors failed.
        status: RequestStatus,
        /// The interceptor error.
        #[source]
        source: EventError,
    },
}

impl ObserverError {
    /// Pipeline tag, when the failure came from the pipeline.
    #[must_use]
    pub const fn kind(&self) -> Option<RequestErrorKind> {
        match self {
            Self::Request(error) => Some(error.kind()),
            Self::MissingApiDef | Self::Interceptor { .. } => None,
        }
    }
}

/// Invalid values found while loading [`crate::config::ObserverConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The path parameter pattern is not a valid regular expression.
    #[error("invalid path params pattern `{pattern}`: {source}")]
    InvalidPathParamsPattern {
        /// The rejected pattern.
        pattern: String,
        /// Compilation error.
        #[source]
        source: regex::Error,
    },

    /// The concurrency limit must be at least one.
    #[error("concurrency limit must be at least 1, got {0}")]
    InvalidLimit(usize),
}

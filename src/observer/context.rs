//! Payloads delivered to interceptors and effects.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};

use super::status::RequestStatus;
use crate::error::{ObserverError, RequestErrorKind};
use crate::request::{ApiDef, Response};

/// Snapshot of a failed request handed to rejected-phase listeners.
///
/// Carries everything the error exposes for diagnostics: the pipeline
/// tag, the raw data being processed and the rendered cause chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureSummary {
    /// Pipeline tag, when a pipeline phase failed.
    pub kind: Option<RequestErrorKind>,
    /// Phase whose interceptors failed, for interceptor failures.
    pub status: Option<RequestStatus>,
    /// Rendered error.
    pub message: String,
    /// Raw value the failing phase was processing, `null` when none.
    pub data: Value,
    /// Rendered causes, outermost first.
    pub causes: Vec<String>,
}

impl From<&ObserverError> for FailureSummary {
    fn from(error: &ObserverError) -> Self {
        let (status, data) = match error {
            ObserverError::Request(request) => (None, request.data().clone()),
            ObserverError::Interceptor { status, .. } => (Some(*status), Value::Null),
            ObserverError::MissingApiDef => (None, Value::Null),
        };
        let mut causes = Vec::new();
        let mut next = std::error::Error::source(error);
        while let Some(cause) = next {
            causes.push(cause.to_string());
            next = cause.source();
        }
        Self {
            kind: error.kind(),
            status,
            message: error.to_string(),
            data,
            causes,
        }
    }
}

/// Outcome attached to a context once the request settles.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum InterceptorDetail {
    /// Not settled yet.
    #[default]
    None,
    /// The validated response.
    Response(Response),
    /// Why the request failed.
    Failure(FailureSummary),
}

#[derive(Debug)]
struct ContextState {
    data: Value,
    options: Map<String, Value>,
    detail: InterceptorDetail,
}

/// Per-request state shared by every interceptor of one `send` call.
///
/// Clones refer to the same request. Data and options rewritten during
/// `prepare` are what gets validated and sent.
#[derive(Debug, Clone)]
pub struct InterceptorContext {
    req_id: Arc<str>,
    api_def: Arc<ApiDef>,
    state: Arc<Mutex<ContextState>>,
}

impl InterceptorContext {
    pub(crate) fn new(
        req_id: &str,
        api_def: ApiDef,
        data: Value,
        options: Map<String, Value>,
    ) -> Self {
        Self {
            req_id: Arc::from(req_id),
            api_def: Arc::new(api_def),
            state: Arc::new(Mutex::new(ContextState {
                data,
                options,
                detail: InterceptorDetail::None,
            })),
        }
    }

    /// Six hex characters identifying the `send` call.
    #[must_use]
    pub fn req_id(&self) -> &str {
        &self.req_id
    }

    /// Definition the request is built from.
    #[must_use]
    pub fn api_def(&self) -> &ApiDef {
        &self.api_def
    }

    /// Current outgoing payload.
    #[must_use]
    pub fn data(&self) -> Value {
        self.state.lock().data.clone()
    }

    /// Replaces the outgoing payload.
    pub fn set_data(&self, data: Value) {
        self.state.lock().data = data;
    }

    /// Current raw options, including `custom.reqId`.
    #[must_use]
    pub fn options(&self) -> Map<String, Value> {
        self.state.lock().options.clone()
    }

    /// Replaces the raw options.
    pub fn set_options(&self, options: Map<String, Value>) {
        self.state.lock().options = options;
    }

    /// Edits the raw options in place.
    pub fn update_options(&self, edit: impl FnOnce(&mut Map<String, Value>)) {
        edit(&mut self.state.lock().options);
    }

    /// Settlement detail.
    #[must_use]
    pub fn detail(&self) -> InterceptorDetail {
        self.state.lock().detail.clone()
    }

    /// Replaces the settlement detail. A resolved interceptor may use this
    /// to rewrite the response returned to the caller.
    pub fn set_detail(&self, detail: InterceptorDetail) {
        self.state.lock().detail = detail;
    }

    /// The response, once resolved.
    #[must_use]
    pub fn response(&self) -> Option<Response> {
        match &self.state.lock().detail {
            InterceptorDetail::Response(response) => Some(response.clone()),
            InterceptorDetail::None | InterceptorDetail::Failure(_) => None,
        }
    }
}

/// What [`Effect::parse`] yields for each phase.
#[derive(Debug, Clone, PartialEq)]
pub enum EffectDetail {
    /// Data and options as they entered the pipeline.
    Prepare {
        /// Request id.
        req_id: String,
        /// Outgoing payload.
        data: Value,
        /// Raw options.
        options: Map<String, Value>,
    },
    /// Data and options right before the fetcher runs.
    Pending {
        /// Request id.
        req_id: String,
        /// Outgoing payload.
        data: Value,
        /// Raw options.
        options: Map<String, Value>,
    },
    /// The settled response.
    Resolved {
        /// Response parser output, or the response data without a parser.
        after_parse: Value,
        /// The validated response, with default data substituted.
        response: Response,
        /// Raw options.
        options: Map<String, Value>,
    },
    /// The failure.
    Rejected {
        /// Why the request failed.
        error: FailureSummary,
        /// Raw options.
        options: Map<String, Value>,
    },
}

/// Passive lifecycle notification.
///
/// The detail is computed only when [`Effect::parse`] is called.
#[derive(Clone)]
pub struct Effect {
    req_id: Arc<str>,
    status: RequestStatus,
    api_def: Arc<ApiDef>,
    parse: Arc<dyn Fn() -> EffectDetail + Send + Sync>,
}

impl Effect {
    pub(crate) fn new(
        context: &InterceptorContext,
        status: RequestStatus,
        parse: impl Fn() -> EffectDetail + Send + Sync + 'static,
    ) -> Self {
        Self {
            req_id: Arc::clone(&context.req_id),
            status,
            api_def: Arc::clone(&context.api_def),
            parse: Arc::new(parse),
        }
    }

    /// Request id.
    #[must_use]
    pub fn req_id(&self) -> &str {
        &self.req_id
    }

    /// Phase being reported.
    #[must_use]
    pub const fn status(&self) -> RequestStatus {
        self.status
    }

    /// Definition of the request.
    #[must_use]
    pub fn api_def(&self) -> &ApiDef {
        &self.api_def
    }

    /// Computes the phase detail.
    #[must_use]
    pub fn parse(&self) -> EffectDetail {
        (self.parse)()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("req_id", &self.req_id)
            .field("status", &self.status)
            .field("url", &self.api_def.url())
            .finish_non_exhaustive()
    }
}

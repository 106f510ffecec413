//! Request observer: interceptors, effects and a concurrency limiter wired
//! around the request pipeline.
//!
//! Each `send` runs through the observer's [`ExecutionLimiter`] and walks
//! the lifecycle `prepare → pending → resolved`, falling to `rejected` on
//! any failure. At every phase the interceptors for that status run first
//! (stopping at the first error, which fails the request), then the
//! effects are notified.
//!
//! Observer state lives in an [`ObserverRecord`]. The `with_*` methods and
//! [`RequestObserver::consume`] derive a new observer with a modified copy
//! of the record; [`RequestObserver::update`] changes it in place.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::context::{Effect, EffectDetail, FailureSummary, InterceptorContext, InterceptorDetail};
use super::status::RequestStatus;
use crate::config::ObserverConfig;
use crate::error::{EventError, ObserverError};
use crate::event::{Canceler, EmitOptions, EventChannel, EventPool, Listener, ListenerOptions};
use crate::limiter::ExecutionLimiter;
use crate::request::{ApiDef, Fetcher, Response, fetcher_fn, prepare};

/// Transforms a resolved response into the value returned by `send`.
pub type ResponseParser = Arc<dyn Fn(&Response) -> Value + Send + Sync>;

/// Interceptor pool keyed by lifecycle status.
pub type Interceptors = EventPool<RequestStatus, InterceptorContext>;

/// Effect channel shared by every status.
pub type Effects = EventChannel<Effect>;

/// Wraps a closure as a [`ResponseParser`].
pub fn response_parser_fn<F>(parse: F) -> ResponseParser
where
    F: Fn(&Response) -> Value + Send + Sync + 'static,
{
    Arc::new(parse)
}

/// Configuration carried by a [`RequestObserver`].
#[derive(Clone)]
pub struct ObserverRecord {
    /// Definition sent by `send`. Required.
    pub api_def: Option<ApiDef>,
    /// Substituted for a `null` response body.
    pub default_response_data: Value,
    /// Raw options merged under the per-call options.
    pub options: Map<String, Value>,
    /// Request executor. `send` fails with an executor error without one.
    pub fetcher: Option<Fetcher>,
    /// Maximum concurrent `send` calls.
    pub limit: usize,
    /// Race (latest wins) or FIFO admission.
    pub race: bool,
    /// Shapes the value returned by `send`.
    pub response_parser: Option<ResponseParser>,
}

impl Default for ObserverRecord {
    fn default() -> Self {
        Self {
            api_def: None,
            default_response_data: Value::Null,
            options: Map::new(),
            fetcher: None,
            limit: 1,
            race: true,
            response_parser: None,
        }
    }
}

impl fmt::Debug for ObserverRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRecord")
            .field("api_def", &self.api_def)
            .field("default_response_data", &self.default_response_data)
            .field("options", &self.options)
            .field("fetcher", &self.fetcher.is_some())
            .field("limit", &self.limit)
            .field("race", &self.race)
            .field("response_parser", &self.response_parser.is_some())
            .finish()
    }
}

/// One in-place change applied by [`RequestObserver::update`].
pub enum ObserverUpdate {
    /// Replace the api definition.
    ApiDef(Option<ApiDef>),
    /// Replace the default response data.
    DefaultResponseData(Value),
    /// Replace the options.
    Options(Map<String, Value>),
    /// Replace the fetcher.
    Fetcher(Option<Fetcher>),
    /// Change the limit; also applied to the live limiter.
    Limit(usize),
    /// Change the admission discipline; also applied to the live limiter.
    Race(bool),
    /// Replace the response parser.
    ResponseParser(Option<ResponseParser>),
}

impl fmt::Debug for ObserverUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiDef(api) => f.debug_tuple("ApiDef").field(api).finish(),
            Self::DefaultResponseData(data) => {
                f.debug_tuple("DefaultResponseData").field(data).finish()
            }
            Self::Options(options) => f.debug_tuple("Options").field(options).finish(),
            Self::Fetcher(fetcher) => f.debug_tuple("Fetcher").field(&fetcher.is_some()).finish(),
            Self::Limit(limit) => f.debug_tuple("Limit").field(limit).finish(),
            Self::Race(race) => f.debug_tuple("Race").field(race).finish(),
            Self::ResponseParser(parser) => f
                .debug_tuple("ResponseParser")
                .field(&parser.is_some())
                .finish(),
        }
    }
}

/// Six hex characters, unique enough to correlate log lines.
fn new_request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string().chars().take(6).collect()
}

fn stamp_request_id(options: &mut Map<String, Value>, req_id: &str) {
    let custom = options
        .entry("custom")
        .or_insert_with(|| Value::Object(Map::new()));
    match custom {
        Value::Object(custom) => {
            custom.insert("reqId".into(), Value::String(req_id.to_string()));
        }
        other => {
            let mut custom = Map::new();
            custom.insert("reqId".into(), Value::String(req_id.to_string()));
            *other = Value::Object(custom);
        }
    }
}

fn unconfigured_fetcher() -> Fetcher {
    fetcher_fn(|_, _, _| async { Err(anyhow::anyhow!("no fetcher configured for this observer")) })
}

/// Applies the default data and the parser. Returns the parsed value and
/// the response as seen by the parser.
fn shape_response(
    default_data: &Value,
    parser: Option<&ResponseParser>,
    mut response: Response,
) -> (Value, Response) {
    if response.data.is_null() {
        response.data = default_data.clone();
    }
    let parsed = match parser {
        Some(parse) => parse(&response),
        None => response.data.clone(),
    };
    (parsed, response)
}

/// Sends requests for one api definition and reports their lifecycle.
pub struct RequestObserver {
    record: ObserverRecord,
    limiter: ExecutionLimiter,
    effects: Effects,
    interceptors: Interceptors,
}

impl RequestObserver {
    /// Observer with a default record and no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::create(ObserverRecord::default(), None, None)
    }

    /// Observer over `record`, reusing the given effect channel and
    /// interceptor pool when provided. Lifecycle topics missing from
    /// `interceptors` are added.
    #[must_use]
    pub fn create(
        record: ObserverRecord,
        effects: Option<Effects>,
        interceptors: Option<Interceptors>,
    ) -> Self {
        let interceptors = match interceptors {
            Some(pool) => {
                let missing: Vec<RequestStatus> = RequestStatus::ALL
                    .into_iter()
                    .filter(|status| pool.channel(status).is_none())
                    .collect();
                if missing.is_empty() {
                    pool
                } else {
                    pool.extend(missing, false)
                }
            }
            None => EventPool::new(RequestStatus::ALL),
        };
        Self {
            limiter: ExecutionLimiter::new(record.limit, record.race),
            record,
            effects: effects.unwrap_or_default(),
            interceptors,
        }
    }

    /// Observer seeded with the limits and default options of `config`.
    #[must_use]
    pub fn from_config(config: &ObserverConfig) -> Self {
        Self::create(
            ObserverRecord {
                options: config.default_options(),
                limit: config.limit,
                race: config.race,
                ..ObserverRecord::default()
            },
            None,
            None,
        )
    }

    /// Current record.
    #[must_use]
    pub const fn record(&self) -> &ObserverRecord {
        &self.record
    }

    /// Consumed api definition, if any.
    #[must_use]
    pub fn api_def(&self) -> Option<&ApiDef> {
        self.record.api_def.as_ref()
    }

    /// The limiter every `send` runs through.
    #[must_use]
    pub const fn limiter(&self) -> &ExecutionLimiter {
        &self.limiter
    }

    /// The effect channel.
    #[must_use]
    pub const fn effects(&self) -> &Effects {
        &self.effects
    }

    /// The interceptor pool.
    #[must_use]
    pub const fn interceptors(&self) -> &Interceptors {
        &self.interceptors
    }

    /// New observer over `record`. Effects and interceptors are copied, or
    /// left empty when `disable_inherit_listeners` is set. The limiter is
    /// always fresh.
    #[must_use]
    pub fn derive(&self, record: ObserverRecord, disable_inherit_listeners: bool) -> Self {
        let effects = if disable_inherit_listeners {
            EventChannel::new()
        } else {
            self.effects.clone()
        };
        let interceptors = self.interceptors.clone_pool(disable_inherit_listeners);
        Self::create(record, Some(effects), Some(interceptors))
    }

    /// [`RequestObserver::derive`] with the current record.
    #[must_use]
    pub fn clone_observer(&self, disable_inherit_listeners: bool) -> Self {
        self.derive(self.record.clone(), disable_inherit_listeners)
    }

    fn derive_with(&self, edit: impl FnOnce(&mut ObserverRecord)) -> Self {
        let mut record = self.record.clone();
        edit(&mut record);
        self.derive(record, false)
    }

    /// Changes this observer in place.
    pub fn update(&mut self, update: ObserverUpdate) -> &mut Self {
        match update {
            ObserverUpdate::ApiDef(api) => self.record.api_def = api,
            ObserverUpdate::DefaultResponseData(data) => self.record.default_response_data = data,
            ObserverUpdate::Options(options) => self.record.options = options,
            ObserverUpdate::Fetcher(fetcher) => self.record.fetcher = fetcher,
            ObserverUpdate::Limit(limit) => {
                self.record.limit = limit.max(1);
                self.limiter.set_limit(limit);
            }
            ObserverUpdate::Race(race) => {
                self.record.race = race;
                self.limiter.set_race(race);
            }
            ObserverUpdate::ResponseParser(parser) => self.record.response_parser = parser,
        }
        self
    }

    /// Derives an observer for `api_def`. The response parser is reset.
    #[must_use]
    pub fn consume(&self, api_def: &ApiDef) -> Self {
        self.derive_with(|record| {
            record.api_def = Some(api_def.clone());
            record.response_parser = None;
        })
    }

    /// Derives an observer with another default response data.
    #[must_use]
    pub fn with_default_response_data(&self, data: Value) -> Self {
        self.derive_with(|record| record.default_response_data = data)
    }

    /// Derives an observer with another limit. Zero is raised to one.
    #[must_use]
    pub fn with_limit(&self, limit: usize) -> Self {
        self.derive_with(|record| record.limit = limit.max(1))
    }

    /// Derives an observer with another admission discipline.
    #[must_use]
    pub fn with_race(&self, race: bool) -> Self {
        self.derive_with(|record| record.race = race)
    }

    /// Derives an observer whose options are replaced by `options` when
    /// `overwrite` is set, or merged over the current ones otherwise.
    #[must_use]
    pub fn with_options(&self, options: Map<String, Value>, overwrite: bool) -> Self {
        self.derive_with(|record| {
            if overwrite {
                record.options = options;
            } else {
                record.options.extend(options);
            }
        })
    }

    /// Derives an observer with another fetcher.
    #[must_use]
    pub fn with_fetcher(&self, fetcher: Option<Fetcher>) -> Self {
        self.derive_with(|record| record.fetcher = fetcher)
    }

    /// Derives an observer with another response parser.
    #[must_use]
    pub fn with_response_parser(&self, parser: Option<ResponseParser>) -> Self {
        self.derive_with(|record| record.response_parser = parser)
    }

    /// Registers an interceptor for `status`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::UnknownTopic`] if the pool lacks `status`,
    /// which cannot happen for pools built by this type.
    pub fn intercept(
        &self,
        status: RequestStatus,
        listener: &Listener<InterceptorContext>,
        options: ListenerOptions,
    ) -> Result<Canceler, EventError> {
        self.interceptors.on(&status, listener, options)
    }

    /// Registers an effect listener for every status.
    pub fn observe(&self, listener: &Listener<Effect>) -> Canceler {
        self.effects.on(listener, ListenerOptions::default())
    }

    /// Removes every effect listener.
    pub fn clear_effects(&self) -> Vec<Listener<Effect>> {
        self.effects.clear()
    }

    /// Removes every interceptor. Returns `true` once all are gone.
    pub fn clear_interceptors(&self) -> bool {
        self.interceptors.clear_all()
    }

    /// Sends `data` with `options` merged over the observer's options.
    ///
    /// Returns the response parser's output, or the response data when no
    /// parser is set. A `null` body is replaced by the default response
    /// data first.
    ///
    /// Under race admission a call that was queued behind a newer one
    /// never completes.
    ///
    /// # Errors
    ///
    /// - [`ObserverError::MissingApiDef`] before any notification if no api
    ///   definition was consumed.
    /// - [`ObserverError::Interceptor`] if an interceptor failed.
    /// - [`ObserverError::Request`] if a pipeline phase failed.
    pub async fn send(
        &self,
        data: Value,
        options: Option<Map<String, Value>>,
    ) -> Result<Value, ObserverError> {
        let mut merged = self.record.options.clone();
        if let Some(options) = options {
            merged.extend(options);
        }
        self.limiter.run(|| self.execute(data, merged)).await
    }

    async fn execute(
        &self,
        data: Value,
        mut options: Map<String, Value>,
    ) -> Result<Value, ObserverError> {
        let Some(api_def) = self.record.api_def.clone() else {
            return Err(ObserverError::MissingApiDef);
        };

        let req_id = new_request_id();
        stamp_request_id(&mut options, &req_id);
        let context = InterceptorContext::new(&req_id, api_def, data, options);

        match self.run_phases(&context).await {
            Ok(response) => {
                let (parsed, _) = shape_response(
                    &self.record.default_response_data,
                    self.record.response_parser.as_ref(),
                    response,
                );
                Ok(parsed)
            }
            Err(error) => Err(self.reject(&context, error).await),
        }
    }

    async fn run_phases(&self, context: &InterceptorContext) -> Result<Response, ObserverError> {
        self.notify(RequestStatus::Prepare, context).await?;
        let detail = EffectDetail::Prepare {
            req_id: context.req_id().to_string(),
            data: context.data(),
            options: context.options(),
        };
        self.emit_effect(context, RequestStatus::Prepare, move || detail.clone())
            .await;

        let prepared = prepare(context.api_def(), context.data(), &context.options()).await?;

        self.notify(RequestStatus::Pending, context).await?;
        let detail = EffectDetail::Pending {
            req_id: context.req_id().to_string(),
            data: prepared.request().data.clone(),
            options: context.options(),
        };
        self.emit_effect(context, RequestStatus::Pending, move || detail.clone())
            .await;

        let fetcher = self.record.fetcher.clone().unwrap_or_else(unconfigured_fetcher);
        let response = prepared.dispatch(&fetcher).await?;
        context.set_detail(InterceptorDetail::Response(response.clone()));

        self.notify(RequestStatus::Resolved, context).await?;
        let response = context.response().unwrap_or(response);

        let default_data = self.record.default_response_data.clone();
        let parser = self.record.response_parser.clone();
        let settled = response.clone();
        let options = context.options();
        self.emit_effect(context, RequestStatus::Resolved, move || {
            let (after_parse, response) =
                shape_response(&default_data, parser.as_ref(), settled.clone());
            EffectDetail::Resolved {
                after_parse,
                response,
                options: options.clone(),
            }
        })
        .await;

        Ok(response)
    }

    /// Runs the rejected phase and returns the error `send` fails with.
    async fn reject(&self, context: &InterceptorContext, error: ObserverError) -> ObserverError {
        tracing::debug!(req_id = context.req_id(), error = %error, "request rejected");
        context.set_detail(InterceptorDetail::Failure(FailureSummary::from(&error)));

        let error = match self.notify(RequestStatus::Rejected, context).await {
            Ok(()) => error,
            Err(replaced) => {
                context.set_detail(InterceptorDetail::Failure(FailureSummary::from(&replaced)));
                replaced
            }
        };

        let detail = EffectDetail::Rejected {
            error: FailureSummary::from(&error),
            options: context.options(),
        };
        self.emit_effect(context, RequestStatus::Rejected, move || detail.clone())
            .await;
        error
    }

    async fn notify(
        &self,
        status: RequestStatus,
        context: &InterceptorContext,
    ) -> Result<(), ObserverError> {
        tracing::debug!(req_id = context.req_id(), %status, "notifying interceptors");
        let options = EmitOptions {
            abort_when_error_occurred: true,
            only_throw_first_error: true,
            ..EmitOptions::default()
        };
        self.interceptors
            .emit(&status, context.clone(), options)
            .await
            .map_err(|source| ObserverError::Interceptor { status, source })
    }

    async fn emit_effect(
        &self,
        context: &InterceptorContext,
        status: RequestStatus,
        parse: impl Fn() -> EffectDetail + Send + Sync + 'static,
    ) {
        let effect = Effect::new(context, status, parse);
        if let Err(error) = self.effects.emit(effect, EmitOptions::default()).await {
            tracing::warn!(
                req_id = context.req_id(),
                %status,
                error = %error,
                "effect listener failed"
            );
        }
    }
}

impl Default for RequestObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestObserver")
            .field("record", &self.record)
            .field("effects", &self.effects)
            .field("interceptors", &self.interceptors)
            .finish_non_exhaustive()
    }
}

//! The validated request pipeline.
//!
//! A request runs in two halves. [`prepare`] validates the api definition,
//! the options, the headers and the payload, then assembles a [`Request`].
//! [`PreparedRequest::dispatch`] hands it to the [`Fetcher`] and validates
//! what comes back. Each phase fails with its own [`RequestErrorKind`].

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

use super::api_def::ApiDef;
use super::types::{Headers, Request, RequestOptions, Response, ResponseType, validate_headers};
use super::url::{expand_path_params, join_url};
use crate::error::{RequestError, RequestErrorKind};

/// Executes a request. Returns the raw response, which must have the
/// [`Response`] shape.
pub type Fetcher = Arc<
    dyn Fn(Request, ApiDef, RequestOptions) -> BoxFuture<'static, anyhow::Result<Value>>
        + Send
        + Sync,
>;

/// Wraps an async closure as a [`Fetcher`].
pub fn fetcher_fn<F, Fut>(fetch: F) -> Fetcher
where
    F: Fn(Request, ApiDef, RequestOptions) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(
        move |request: Request,
              api: ApiDef,
              options: RequestOptions|
              -> BoxFuture<'static, anyhow::Result<Value>> {
            Box::pin(fetch(request, api, options))
        },
    )
}

/// A validated request ready for the fetcher.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    api: ApiDef,
    request: Request,
    options: RequestOptions,
}

impl PreparedRequest {
    /// The assembled request.
    #[must_use]
    pub const fn request(&self) -> &Request {
        &self.request
    }

    /// Parsed options.
    #[must_use]
    pub const fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// Definition the request was built from.
    #[must_use]
    pub const fn api(&self) -> &ApiDef {
        &self.api
    }

    /// Calls `fetcher` and validates the response.
    ///
    /// # Errors
    ///
    /// - [`RequestErrorKind::RequestExecutor`] if the fetcher fails.
    /// - [`RequestErrorKind::ResponseDtoValidation`] if the result is not a
    ///   response.
    /// - [`RequestErrorKind::ResponseDataTransform`] if a textual json body
    ///   cannot be decoded.
    /// - [`RequestErrorKind::ResponseDataStructValidation`] or
    ///   [`RequestErrorKind::ResponseDataValidation`] if a response schema
    ///   rejects the data.
    pub async fn dispatch(self, fetcher: &Fetcher) -> Result<Response, RequestError> {
        let Self { api, request, options } = self;
        let response_type = request.response_type;

        let raw = fetcher(request, api.clone(), options).await.map_err(|e| {
            RequestError::new(
                RequestErrorKind::RequestExecutor,
                "Request executor failed.",
                api.summary(),
                e,
            )
        })?;

        let mut response: Response = serde_json::from_value(raw.clone()).map_err(|e| {
            RequestError::new(
                RequestErrorKind::ResponseDtoValidation,
                "Validate response struct failed.",
                raw.clone(),
                e,
            )
        })?;
        validate_headers(&response.headers, "headers").map_err(|e| {
            RequestError::new(
                RequestErrorKind::ResponseDtoValidation,
                "Validate response struct failed.",
                raw,
                e,
            )
        })?;

        if response_type == ResponseType::Json
            && let Value::String(text) = &response.data
        {
            let decoded = serde_json::from_str(text).map_err(|e| {
                RequestError::new(
                    RequestErrorKind::ResponseDataTransform,
                    "Transform response data to JSON failed.",
                    response.to_value(),
                    e,
                )
            })?;
            response.data = decoded;
        }

        if let Some(schema) = api.response_struct_schema() {
            schema.validate(response.data.clone()).map_err(|e| {
                RequestError::new(
                    RequestErrorKind::ResponseDataStructValidation,
                    "Validate response data struct failed.",
                    response.to_value(),
                    e,
                )
            })?;
        }

        if let Some(schema) = api.response_schema() {
            let data = std::mem::take(&mut response.data);
            response.data = schema.validate(data.clone()).map_err(|e| {
                RequestError::new(
                    RequestErrorKind::ResponseDataValidation,
                    "Validate response data failed.",
                    Response { data, ..response.clone() }.to_value(),
                    e,
                )
            })?;
        }

        Ok(response)
    }
}

/// Validates `api`, `options` and `data` and assembles the request.
///
/// A `null` payload is treated as an empty object.
///
/// # Errors
///
/// - [`RequestErrorKind::ApiValidation`] if the definition is malformed or
///   its headers provider fails or yields invalid headers.
/// - [`RequestErrorKind::ConfigValidation`] if `options` are malformed.
/// - [`RequestErrorKind::RequestDataValidation`] if the data schema
///   rejects the payload.
/// - [`RequestErrorKind::RequestDtoValidation`] if the path parameter
///   pattern is invalid or the assembled request is malformed.
pub async fn prepare(
    api: &ApiDef,
    data: Value,
    options: &Map<String, Value>,
) -> Result<PreparedRequest, RequestError> {
    api.validate().map_err(|e| {
        RequestError::new(
            RequestErrorKind::ApiValidation,
            "Validate API setup failed.",
            api.summary(),
            e,
        )
    })?;

    let options = RequestOptions::parse(options).map_err(|e| {
        RequestError::new(
            RequestErrorKind::ConfigValidation,
            "Validate config setup failed.",
            Value::Object(options.clone()),
            e,
        )
    })?;

    let mut headers = resolve_headers(api).await?;

    let data = if data.is_null() {
        Value::Object(Map::new())
    } else {
        data
    };
    let data = match api.data_schema() {
        Some(schema) => schema.validate(data.clone()).map_err(|e| {
            RequestError::new(
                RequestErrorKind::RequestDataValidation,
                "Validate request data failed.",
                data,
                e,
            )
        })?,
        None => data,
    };

    let url = expand_path_params(
        &join_url(api.base_url(), api.url()),
        &data,
        &options.path_params_pattern,
    )
    .map_err(|e| {
        RequestError::new(
            RequestErrorKind::RequestDtoValidation,
            "Validate request struct failed.",
            api.summary(),
            e,
        )
    })?;

    headers.extend(options.headers.clone());
    let request = Request {
        url,
        method: api.method(),
        headers,
        data,
        response_type: api.response_type(),
        custom: api.custom().clone(),
        extra: Map::new(),
    };
    request.validate().map_err(|e| {
        RequestError::new(
            RequestErrorKind::RequestDtoValidation,
            "Validate request struct failed.",
            api.summary(),
            e,
        )
    })?;

    Ok(PreparedRequest {
        api: api.clone(),
        request,
        options,
    })
}

async fn resolve_headers(api: &ApiDef) -> Result<Headers, RequestError> {
    let Some(provider) = api.headers() else {
        return Ok(Headers::new());
    };
    let header_error = |e: crate::error::BoxError| {
        RequestError::new(
            RequestErrorKind::ApiValidation,
            "Validate API headers setup failed.",
            api.summary(),
            e,
        )
    };

    let raw = provider(api).await.map_err(|e| header_error(e.into()))?;
    if raw.is_null() {
        return Ok(Headers::new());
    }
    let headers: Headers = serde_json::from_value(raw).map_err(|e| header_error(e.into()))?;
    validate_headers(&headers, "headers").map_err(|e| header_error(e.into()))?;
    Ok(headers)
}

/// Runs [`prepare`] and then [`PreparedRequest::dispatch`].
///
/// # Errors
///
/// Any error of either phase.
pub async fn request(
    fetcher: &Fetcher,
    api: &ApiDef,
    data: Value,
    options: &Map<String, Value>,
) -> Result<Response, RequestError> {
    prepare(api, data, options).await?.dispatch(fetcher).await
}

//! Immutable api definition.
//!
//! Every `with_*` setter returns a new [`ApiDef`]; the receiver is never
//! modified, so a base definition can be shared and specialised freely.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::{Map, Value, json};

use super::schema::SharedSchema;
use super::types::{RequestMethod, ResponseType};
use crate::error::SchemaError;

/// Computes request headers for an api definition. The returned value must
/// be an object of string values.
pub type HeadersProvider =
    Arc<dyn Fn(&ApiDef) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Describes one remote endpoint and how to validate its traffic.
#[derive(Clone, Default)]
pub struct ApiDef {
    base_url: String,
    url: String,
    method: RequestMethod,
    response_type: ResponseType,
    headers: Option<HeadersProvider>,
    data: Option<SharedSchema>,
    response: Option<SharedSchema>,
    response_struct: Option<SharedSchema>,
    custom: Map<String, Value>,
}

impl ApiDef {
    /// Definition for `url` with default method (`GET`) and response type
    /// (`json`).
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Prefix joined in front of relative urls.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Endpoint path or absolute url.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> RequestMethod {
        self.method
    }

    /// Expected response body shape.
    #[must_use]
    pub const fn response_type(&self) -> ResponseType {
        self.response_type
    }

    /// Headers provider, if any.
    #[must_use]
    pub fn headers(&self) -> Option<&HeadersProvider> {
        self.headers.as_ref()
    }

    /// Schema for the outgoing payload.
    #[must_use]
    pub fn data_schema(&self) -> Option<&SharedSchema> {
        self.data.as_ref()
    }

    /// Schema for the response data. Its output replaces the data.
    #[must_use]
    pub fn response_schema(&self) -> Option<&SharedSchema> {
        self.response.as_ref()
    }

    /// Schema checking the response data envelope only; the data itself
    /// is left unchanged.
    #[must_use]
    pub fn response_struct_schema(&self) -> Option<&SharedSchema> {
        self.response_struct.as_ref()
    }

    /// Custom values copied onto every request.
    #[must_use]
    pub fn custom(&self) -> &Map<String, Value> {
        &self.custom
    }

    /// Copy with another base url.
    #[must_use]
    pub fn with_base_url(&self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..self.clone()
        }
    }

    /// Copy with another url.
    #[must_use]
    pub fn with_url(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..self.clone()
        }
    }

    /// Copy with another method.
    #[must_use]
    pub fn with_method(&self, method: RequestMethod) -> Self {
        Self {
            method,
            ..self.clone()
        }
    }

    /// Copy with another response type.
    #[must_use]
    pub fn with_response_type(&self, response_type: ResponseType) -> Self {
        Self {
            response_type,
            ..self.clone()
        }
    }

    /// Sets an async headers provider.
    #[must_use]
    pub fn with_headers<F, Fut>(&self, provider: F) -> Self
    where
        F: Fn(&Self) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let provider: HeadersProvider =
            Arc::new(move |api: &Self| -> BoxFuture<'static, anyhow::Result<Value>> {
                Box::pin(provider(api))
            });
        Self {
            headers: Some(provider),
            ..self.clone()
        }
    }

    /// Removes the headers provider.
    #[must_use]
    pub fn without_headers(&self) -> Self {
        Self {
            headers: None,
            ..self.clone()
        }
    }

    /// Copy with another payload schema.
    #[must_use]
    pub fn with_data(&self, schema: Option<SharedSchema>) -> Self {
        Self {
            data: schema,
            ..self.clone()
        }
    }

    /// Copy with another response data schema.
    #[must_use]
    pub fn with_response(&self, schema: Option<SharedSchema>) -> Self {
        Self {
            response: schema,
            ..self.clone()
        }
    }

    /// Copy with another response envelope schema.
    #[must_use]
    pub fn with_response_struct(&self, schema: Option<SharedSchema>) -> Self {
        Self {
            response_struct: schema,
            ..self.clone()
        }
    }

    /// Replaces the custom map when `overwrite` is set, otherwise merges
    /// `custom` over the current one.
    #[must_use]
    pub fn with_custom(&self, custom: Map<String, Value>, overwrite: bool) -> Self {
        let custom = if overwrite {
            custom
        } else {
            let mut merged = self.custom.clone();
            merged.extend(custom);
            merged
        };
        Self {
            custom,
            ..self.clone()
        }
    }

    /// Checks the definition before it is used.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] when the url is empty.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.url.is_empty() {
            return Err(SchemaError::at("url", "url must not be empty"));
        }
        Ok(())
    }

    /// JSON description used as the data of pipeline errors.
    #[must_use]
    pub fn summary(&self) -> Value {
        json!({
            "baseUrl": self.base_url,
            "url": self.url,
            "method": self.method,
            "responseType": self.response_type,
            "custom": self.custom,
            "hasHeaders": self.headers.is_some(),
            "hasData": self.data.is_some(),
            "hasResponse": self.response.is_some(),
            "hasResponseStruct": self.response_struct.is_some(),
        })
    }
}

impl fmt::Debug for ApiDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiDef")
            .field("base_url", &self.base_url)
            .field("url", &self.url)
            .field("method", &self.method)
            .field("response_type", &self.response_type)
            .field("headers", &self.headers.is_some())
            .field("data", &self.data.is_some())
            .field("response", &self.response.is_some())
            .field("response_struct", &self.response_struct.is_some())
            .field("custom", &self.custom)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::request::schema::TypedSchema;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn setters_never_touch_the_receiver() {
        let base = ApiDef::new("api/v1/list");
        let post = base
            .with_base_url("/gateway/")
            .with_method(RequestMethod::Post)
            .with_response(Some(TypedSchema::<Value>::shared()));

        assert_eq!(base.base_url(), "");
        assert_eq!(base.method(), RequestMethod::Get);
        assert!(base.response_schema().is_none());

        assert_eq!(post.base_url(), "/gateway/");
        assert_eq!(post.url(), "api/v1/list");
        assert_eq!(post.method(), RequestMethod::Post);
        assert!(post.response_schema().is_some());
    }

    #[test]
    fn custom_merges_or_overwrites() {
        let api = ApiDef::new("x").with_custom(object(json!({ "a": 1, "b": 2 })), false);
        let merged = api.with_custom(object(json!({ "b": 3 })), false);
        let replaced = api.with_custom(object(json!({ "c": 4 })), true);

        assert_eq!(Value::Object(merged.custom().clone()), json!({ "a": 1, "b": 3 }));
        assert_eq!(Value::Object(replaced.custom().clone()), json!({ "c": 4 }));
        assert_eq!(Value::Object(api.custom().clone()), json!({ "a": 1, "b": 2 }));
    }

    #[tokio::test]
    async fn headers_provider_sees_the_definition() {
        let api = ApiDef::new("users").with_headers(|api: &ApiDef| {
            let url = api.url().to_string();
            async move { Ok(json!({ "x-endpoint": url })) }
        });
        let Some(provider) = api.headers() else {
            panic!("provider not stored");
        };
        let Ok(headers) = provider(&api).await else {
            panic!("provider failed");
        };
        assert_eq!(headers, json!({ "x-endpoint": "users" }));
        assert!(api.without_headers().headers().is_none());
    }

    #[test]
    fn empty_url_is_invalid() {
        assert!(ApiDef::default().validate().is_err());
        assert!(ApiDef::new("ok").validate().is_ok());
        assert_eq!(ApiDef::new("ok").summary()["method"], json!("GET"));
    }
}

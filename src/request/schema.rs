//! Validation seam for request and response payloads.
//!
//! The pipeline knows nothing about schema languages. It hands a JSON value
//! to a [`Schema`] and continues with whatever validated (possibly
//! defaulted) value comes back.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::SchemaError;

/// Validates and normalises a JSON value.
pub trait Schema: Send + Sync {
    /// Returns the validated value.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] describing why `value` was rejected.
    fn validate(&self, value: Value) -> Result<Value, SchemaError>;
}

/// Shared schema handle stored on api definitions.
pub type SharedSchema = Arc<dyn Schema>;

/// [`Schema`] backed by a closure.
pub struct FnSchema<F> {
    validate: F,
}

impl<F> Schema for FnSchema<F>
where
    F: Fn(Value) -> Result<Value, SchemaError> + Send + Sync,
{
    fn validate(&self, value: Value) -> Result<Value, SchemaError> {
        (self.validate)(value)
    }
}

impl<F> fmt::Debug for FnSchema<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnSchema")
    }
}

/// Wraps a closure as a shared schema.
pub fn schema_fn<F>(validate: F) -> SharedSchema
where
    F: Fn(Value) -> Result<Value, SchemaError> + Send + Sync + 'static,
{
    Arc::new(FnSchema { validate })
}

/// Uses a serde type as the schema: the value must deserialize into `T`,
/// and the re-serialized `T` (with its defaults applied) is the output.
pub struct TypedSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T>
where
    T: DeserializeOwned + Serialize + 'static,
{
    /// Shared schema for `T`.
    #[must_use]
    pub fn shared() -> SharedSchema {
        Arc::new(Self {
            _marker: PhantomData,
        })
    }
}

impl<T> Schema for TypedSchema<T>
where
    T: DeserializeOwned + Serialize,
{
    fn validate(&self, value: Value) -> Result<Value, SchemaError> {
        let typed: T = serde_json::from_value(value).map_err(|e| SchemaError::new(e.to_string()))?;
        serde_json::to_value(typed).map_err(|e| SchemaError::new(e.to_string()))
    }
}

impl<T> fmt::Debug for TypedSchema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedSchema")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

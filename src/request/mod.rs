//! Schema-validated request pipeline.
//!
//! The crate never performs network I/O. Callers supply a [`Fetcher`] and
//! the pipeline validates everything that flows into and out of it.

pub mod api_def;
pub mod pipeline;
pub mod schema;
pub mod types;
pub mod url;

pub use api_def::{ApiDef, HeadersProvider};
pub use pipeline::{Fetcher, PreparedRequest, fetcher_fn, prepare, request};
pub use schema::{FnSchema, Schema, SharedSchema, TypedSchema, schema_fn};
pub use types::{Headers, Request, RequestMethod, RequestOptions, Response, ResponseType};
pub use url::{DEFAULT_PATH_PARAMS_PATTERN, expand_path_params, join_url};

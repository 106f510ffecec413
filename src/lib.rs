//! # atom-request
//!
//! Ordered event channels, an async execution limiter and a request
//! observer that drives schema-validated HTTP-style requests through a
//! lifecycle of interceptable phases.
//!
//! The crate performs no I/O itself: the transport is a caller-supplied
//! [`request::Fetcher`].
//!
//! ## Architecture
//!
//! ```text
//! RequestObserver (observer/)
//!     │
//!     ├── ExecutionLimiter (limiter)
//!     ├── Interceptors: EventPool<RequestStatus, _> (event/)
//!     ├── Effects: EventChannel<Effect> (event/)
//!     │
//!     └── prepare → dispatch pipeline (request/)
//!             ├── ApiDef + schemas
//!             └── Fetcher (caller supplied)
//! ```
//!
//! [`logger::Logger`] is a standalone formatting façade whose default sink
//! forwards to `tracing`.

pub mod config;
pub mod error;
pub mod event;
pub mod limiter;
pub mod logger;
pub mod observer;
pub mod request;

pub use error::{ObserverError, RequestError, RequestErrorKind};
pub use event::{EventChannel, EventPool};
pub use limiter::ExecutionLimiter;
pub use observer::{RequestObserver, RequestStatus};
pub use request::ApiDef;

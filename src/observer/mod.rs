//! Request observer and its lifecycle payloads.

pub mod context;
pub mod request_observer;
pub mod status;

pub use context::{Effect, EffectDetail, FailureSummary, InterceptorContext, InterceptorDetail};
pub use request_observer::{
    Effects, Interceptors, ObserverRecord, ObserverUpdate, RequestObserver, ResponseParser,
    response_parser_fn,
};
pub use status::RequestStatus;

//! Event layer: listener handles, ordered channels and topic pools.
//!
//! [`EventChannel`] is the single-topic primitive; [`EventPool`] maps
//! named topics to independent channels.

pub mod channel;
pub mod listener;
pub mod pool;

pub use channel::EventChannel;
pub use listener::{
    Aborter, Canceler, DEFAULT_ORDER, EmitOptions, Listener, ListenerId, ListenerOptions,
};
pub use pool::EventPool;

//! Listener handles and the options passed alongside them.
//!
//! A [`Listener`] is a cheaply cloneable handle around an async callback.
//! Clones share the same [`ListenerId`], which is the identity used by
//! channels for deduplication and removal. Ordering and once-metadata are
//! stored by the channel that registered the listener, never on the
//! listener itself, so one handle can live in several channels at once.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::BoxFuture;
use parking_lot::Mutex;

/// Order assigned to listeners registered without an explicit one.
pub const DEFAULT_ORDER: i64 = 999;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

type ListenerFn<T> = dyn Fn(T, Aborter) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// An async callback invoked with each emitted payload.
///
/// The second argument is the [`Aborter`] of the current emit cycle.
pub struct Listener<T> {
    id: ListenerId,
    callback: Arc<ListenerFn<T>>,
}

impl<T: 'static> Listener<T> {
    /// Wraps an async callback.
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(T, Aborter) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            id: ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed)),
            callback: Arc::new(
                move |payload: T, aborter: Aborter| -> BoxFuture<'static, anyhow::Result<()>> {
                    Box::pin(callback(payload, aborter))
                },
            ),
        }
    }

    /// Wraps a synchronous callback.
    pub fn from_fn<F>(callback: F) -> Self
    where
        F: Fn(T, Aborter) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::new(move |payload, aborter| std::future::ready(callback(payload, aborter)))
    }
}

impl<T> Listener<T> {
    /// Identity shared by every clone of this handle.
    #[must_use]
    pub const fn id(&self) -> ListenerId {
        self.id
    }

    pub(crate) fn invoke(
        &self,
        payload: T,
        aborter: Aborter,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        (self.callback)(payload, aborter)
    }
}

impl<T> Clone for Listener<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<T> PartialEq for Listener<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Listener<T> {}

impl<T> fmt::Debug for Listener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish()
    }
}

/// Registration options for [`crate::event::EventChannel::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Lower runs earlier. Defaults to [`DEFAULT_ORDER`].
    pub order: i64,
    /// Remove the listener after its first invocation.
    pub once: bool,
}

impl ListenerOptions {
    /// Options with the given order.
    #[must_use]
    pub const fn ordered(order: i64) -> Self {
        Self { order, once: false }
    }

    /// Marks the registration as once-only.
    #[must_use]
    pub const fn once(mut self) -> Self {
        self.once = true;
        self
    }
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self::ordered(DEFAULT_ORDER)
    }
}

/// Options for a single emit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitOptions {
    /// Poll each listener once inline instead of awaiting it. Work left
    /// unfinished continues on the runtime and its error is only logged.
    pub sync: bool,
    /// Stop at the first listener error.
    pub abort_when_error_occurred: bool,
    /// Report only the first recorded error instead of all of them.
    pub only_throw_first_error: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            sync: false,
            abort_when_error_occurred: false,
            only_throw_first_error: true,
        }
    }
}

#[derive(Debug, Default)]
struct AbortState {
    aborted: bool,
    reason: Option<String>,
}

/// Stops the remaining listeners of the current emit cycle.
#[derive(Debug, Clone, Default)]
pub struct Aborter {
    state: Arc<Mutex<AbortState>>,
}

impl Aborter {
    /// Creates a fresh, un-aborted handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips every listener that has not run yet.
    pub fn abort(&self) {
        self.state.lock().aborted = true;
    }

    /// Like [`Aborter::abort`], recording why.
    pub fn abort_with(&self, reason: impl Into<String>) {
        let mut state = self.state.lock();
        state.aborted = true;
        state.reason = Some(reason.into());
    }

    /// Whether the cycle has been aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    /// Reason given to [`Aborter::abort_with`], if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.state.lock().reason.clone()
    }
}

/// Removes exactly one registration when [`Canceler::cancel`] is called.
///
/// Holds only a weak reference, so it never keeps a channel alive.
pub struct Canceler {
    cancel: Option<Box<dyn Fn() -> bool + Send + Sync>>,
}

impl Canceler {
    pub(crate) fn new(cancel: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A canceler with nothing to remove; always reports success.
    #[must_use]
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Removes the registration. Returns whether anything was removed;
    /// calling it again returns `false`.
    pub fn cancel(&self) -> bool {
        self.cancel.as_ref().is_none_or(|cancel| cancel())
    }
}

impl fmt::Debug for Canceler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canceler")
            .field("noop", &self.cancel.is_none())
            .finish()
    }
}

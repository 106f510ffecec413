//! Single-topic listener registry with ordered, sequential emission.
//!
//! [`EventChannel`] keeps its registrations in a `Vec` sorted by order
//! (stable, so equal orders keep insertion order). The lock is only held
//! for bookkeeping and never across a listener invocation, so listeners
//! may register or remove listeners while an emit is in progress.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;

use super::listener::{Aborter, Canceler, EmitOptions, Listener, ListenerId, ListenerOptions};
use crate::error::EventError;

struct ListenerRecord<T> {
    listener: Listener<T>,
    order: i64,
    /// Present for once-registrations; flips to `true` on first invocation.
    fired: Option<Arc<AtomicBool>>,
}

impl<T> Clone for ListenerRecord<T> {
    fn clone(&self) -> Self {
        Self {
            listener: self.listener.clone(),
            order: self.order,
            fired: self.fired.as_ref().map(Arc::clone),
        }
    }
}

type Records<T> = Arc<Mutex<Vec<ListenerRecord<T>>>>;

fn remove_record<T>(records: &Mutex<Vec<ListenerRecord<T>>>, id: ListenerId) -> bool {
    let mut records = records.lock();
    let before = records.len();
    records.retain(|record| record.listener.id() != id);
    records.len() != before
}

/// Ordered multi-listener event primitive for one payload type.
pub struct EventChannel<T> {
    records: Records<T>,
}

impl<T> EventChannel<T>
where
    T: Clone + Send + 'static,
{
    /// Creates an empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Registers `listener`.
    ///
    /// Registering an identity that is already present does not duplicate
    /// it; its order is refreshed instead. With `options.once` set this
    /// behaves like [`EventChannel::once`].
    pub fn on(&self, listener: &Listener<T>, options: ListenerOptions) -> Canceler {
        if options.once {
            return self.once(listener, options.order);
        }
        self.upsert(listener, options.order, None)
    }

    /// Registers `listener` to run at most once.
    ///
    /// Registering the same identity twice reuses the first registration.
    /// [`EventChannel::off`] cancels it as long as it has not fired.
    pub fn once(&self, listener: &Listener<T>, order: i64) -> Canceler {
        let fired = self
            .records
            .lock()
            .iter()
            .find(|record| record.listener.id() == listener.id())
            .and_then(|record| record.fired.as_ref().map(Arc::clone))
            .unwrap_or_else(|| Arc::new(AtomicBool::new(false)));
        self.upsert(listener, order, Some(fired))
    }

    fn upsert(
        &self,
        listener: &Listener<T>,
        order: i64,
        fired: Option<Arc<AtomicBool>>,
    ) -> Canceler {
        let id = listener.id();
        {
            let mut records = self.records.lock();
            match records.iter_mut().find(|record| record.listener.id() == id) {
                Some(record) => {
                    record.order = order;
                    record.fired = fired;
                }
                None => records.push(ListenerRecord {
                    listener: listener.clone(),
                    order,
                    fired,
                }),
            }
            records.sort_by_key(|record| record.order);
        }

        let weak: Weak<Mutex<Vec<ListenerRecord<T>>>> = Arc::downgrade(&self.records);
        Canceler::new(move || {
            weak.upgrade()
                .is_some_and(|records| remove_record(&records, id))
        })
    }

    /// Removes `listener`. Returns whether it was registered.
    pub fn off(&self, listener: &Listener<T>) -> bool {
        remove_record(&self.records, listener.id())
    }

    /// Removes every listener and returns them in their former order.
    ///
    /// The returned handles carry no channel metadata and may be
    /// registered elsewhere as if new.
    pub fn clear(&self) -> Vec<Listener<T>> {
        std::mem::take(&mut *self.records.lock())
            .into_iter()
            .map(|record| record.listener)
            .collect()
    }

    /// Snapshot of the registered listeners in invocation order.
    #[must_use]
    pub fn registered_listeners(&self) -> Vec<Listener<T>> {
        self.records
            .lock()
            .iter()
            .map(|record| record.listener.clone())
            .collect()
    }

    /// Order of `listener` in this channel, if registered.
    #[must_use]
    pub fn order_of(&self, listener: &Listener<T>) -> Option<i64> {
        self.records
            .lock()
            .iter()
            .find(|record| record.listener.id() == listener.id())
            .map(|record| record.order)
    }

    /// Whether `listener` is registered.
    #[must_use]
    pub fn contains(&self, listener: &Listener<T>) -> bool {
        self.order_of(listener).is_some()
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Invokes the listeners registered when the call starts, lowest order
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Listener`] with the first recorded listener
    /// error, or [`EventError::Listeners`] with all of them when
    /// `only_throw_first_error` is unset.
    pub async fn emit(&self, payload: T, options: EmitOptions) -> Result<(), EventError> {
        let snapshot: Vec<ListenerRecord<T>> = self.records.lock().clone();
        let total = snapshot.len();
        let aborter = Aborter::new();
        let mut errors = Vec::new();

        for (index, record) in snapshot.into_iter().enumerate() {
            if aborter.is_aborted() {
                tracing::warn!(
                    skipped = total - index,
                    reason = %aborter.reason().unwrap_or_default(),
                    "abort flag received, skipping the rest of this emit cycle"
                );
                break;
            }

            if let Some(fired) = &record.fired {
                if fired.swap(true, Ordering::AcqRel) {
                    continue;
                }
                self.records.lock().retain(|other| {
                    other.listener.id() != record.listener.id()
                        || !other.fired.as_ref().is_some_and(|flag| Arc::ptr_eq(flag, fired))
                });
            }

            let invocation = record.listener.invoke(payload.clone(), aborter.clone());
            let outcome = if options.sync {
                run_detached(invocation, record.listener.id())
            } else {
                invocation.await
            };

            if let Err(error) = outcome {
                tracing::error!(
                    listener = %record.listener.id(),
                    error = %error,
                    "listener failed during emit"
                );
                errors.push(error);
                if options.abort_when_error_occurred {
                    break;
                }
            }
        }

        let mut errors = errors.into_iter();
        match errors.next() {
            None => Ok(()),
            Some(first) if options.only_throw_first_error => Err(EventError::Listener(first)),
            Some(first) => Err(EventError::Listeners(
                std::iter::once(first).chain(errors).collect(),
            )),
        }
    }
}

/// Polls `invocation` once; if it is still pending, the remainder keeps
/// running on the current runtime and its outcome is only logged.
fn run_detached(
    mut invocation: BoxFuture<'static, anyhow::Result<()>>,
    id: ListenerId,
) -> anyhow::Result<()> {
    if let Some(outcome) = (&mut invocation).now_or_never() {
        return outcome;
    }
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(error) = invocation.await {
                    tracing::error!(listener = %id, error = %error, "detached listener failed");
                }
            });
        }
        Err(_) => {
            tracing::warn!(listener = %id, "no runtime available, dropping unfinished listener");
        }
    }
    Ok(())
}

impl<T> Clone for EventChannel<T> {
    /// Independent channel holding the same listener identities with their
    /// current order and once state.
    fn clone(&self) -> Self {
        let records = self
            .records
            .lock()
            .iter()
            .map(|record| ListenerRecord {
                listener: record.listener.clone(),
                order: record.order,
                fired: record
                    .fired
                    .as_ref()
                    .map(|flag| Arc::new(AtomicBool::new(flag.load(Ordering::Acquire)))),
            })
            .collect();
        Self {
            records: Arc::new(Mutex::new(records)),
        }
    }
}

impl<T> Default for EventChannel<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EventChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("listeners", &self.records.lock().len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    type Log = Arc<StdMutex<Vec<String>>>;

    fn recorder(log: &Log, name: &str) -> Listener<u32> {
        let log = Arc::clone(log);
        let name = name.to_string();
        Listener::from_fn(move |n, _| {
            log.lock()
                .map_err(|_| anyhow::anyhow!("poisoned"))?
                .push(format!("{name}:{n}"));
            Ok(())
        })
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn failing(message: &'static str) -> Listener<u32> {
        Listener::from_fn(move |_, _| Err(anyhow::anyhow!(message)))
    }

    #[tokio::test]
    async fn emits_in_ascending_order_with_stable_ties() {
        let log = Log::default();
        let channel = EventChannel::new();
        channel.on(&recorder(&log, "late"), ListenerOptions::default());
        channel.on(&recorder(&log, "first"), ListenerOptions::ordered(1));
        channel.on(&recorder(&log, "tie-a"), ListenerOptions::ordered(5));
        channel.on(&recorder(&log, "tie-b"), ListenerOptions::ordered(5));

        let result = channel.emit(1, EmitOptions::default()).await;
        assert!(result.is_ok());
        assert_eq!(entries(&log), ["first:1", "tie-a:1", "tie-b:1", "late:1"]);
    }

    #[tokio::test]
    async fn re_registering_refreshes_order_without_duplicating() {
        let log = Log::default();
        let channel = EventChannel::new();
        let a = recorder(&log, "a");
        let b = recorder(&log, "b");
        channel.on(&a, ListenerOptions::ordered(1));
        channel.on(&b, ListenerOptions::ordered(2));
        channel.on(&a, ListenerOptions::ordered(3));

        assert_eq!(channel.len(), 2);
        assert_eq!(channel.order_of(&a), Some(3));
        let _ = channel.emit(0, EmitOptions::default()).await;
        assert_eq!(entries(&log), ["b:0", "a:0"]);
    }

    #[tokio::test]
    async fn canceler_removes_exactly_once() {
        let log = Log::default();
        let channel = EventChannel::new();
        let a = recorder(&log, "a");
        let canceler = channel.on(&a, ListenerOptions::default());
        channel.on(&recorder(&log, "b"), ListenerOptions::default());

        assert!(canceler.cancel());
        assert!(!canceler.cancel());
        assert!(!channel.off(&a));
        let _ = channel.emit(2, EmitOptions::default()).await;
        assert_eq!(entries(&log), ["b:2"]);
    }

    #[tokio::test]
    async fn once_fires_a_single_time() {
        let log = Log::default();
        let channel = EventChannel::new();
        let a = recorder(&log, "a");
        channel.once(&a, 1);
        channel.once(&a, 1);
        assert_eq!(channel.len(), 1);

        let _ = channel.emit(1, EmitOptions::default()).await;
        let _ = channel.emit(2, EmitOptions::default()).await;
        assert_eq!(entries(&log), ["a:1"]);
        assert!(channel.is_empty());
    }

    #[tokio::test]
    async fn once_option_delegates_to_once() {
        let log = Log::default();
        let channel = EventChannel::new();
        channel.on(&recorder(&log, "a"), ListenerOptions::ordered(2).once());

        let _ = channel.emit(1, EmitOptions::default()).await;
        let _ = channel.emit(2, EmitOptions::default()).await;
        assert_eq!(entries(&log), ["a:1"]);
    }

    #[tokio::test]
    async fn off_cancels_once_before_it_fires() {
        let log = Log::default();
        let channel = EventChannel::new();
        let a = recorder(&log, "a");
        channel.once(&a, 1);

        assert!(channel.off(&a));
        let _ = channel.emit(1, EmitOptions::default()).await;
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn overlapping_emits_fire_once_listener_once() {
        let count = Arc::new(StdMutex::new(0u32));
        let channel = EventChannel::new();
        let gate: Listener<u32> = Listener::new(|_, _| async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(())
        });
        let counted = {
            let count = Arc::clone(&count);
            Listener::from_fn(move |_, _| {
                if let Ok(mut count) = count.lock() {
                    *count += 1;
                }
                Ok(())
            })
        };
        channel.on(&gate, ListenerOptions::ordered(0));
        channel.once(&counted, 1);

        let (first, second) = tokio::join!(
            channel.emit(1, EmitOptions::default()),
            channel.emit(2, EmitOptions::default())
        );
        assert!(first.is_ok() && second.is_ok());
        assert_eq!(count.lock().map(|c| *c).unwrap_or_default(), 1);
    }

    #[tokio::test]
    async fn snapshot_ignores_mid_emit_changes() {
        let log = Log::default();
        let channel = Arc::new(EventChannel::new());
        let late = recorder(&log, "late");
        let victim = recorder(&log, "victim");
        let mutator = {
            let channel = Arc::clone(&channel);
            let late = late.clone();
            let victim = victim.clone();
            Listener::from_fn(move |_, _| {
                channel.on(&late, ListenerOptions::ordered(100));
                channel.off(&victim);
                Ok(())
            })
        };
        channel.on(&mutator, ListenerOptions::ordered(1));
        channel.on(&victim, ListenerOptions::ordered(2));

        let _ = channel.emit(1, EmitOptions::default()).await;
        assert_eq!(entries(&log), ["victim:1"]);

        let _ = channel.emit(2, EmitOptions::default()).await;
        assert_eq!(entries(&log), ["victim:1", "late:2"]);
    }

    #[tokio::test]
    async fn abort_skips_remaining_listeners() {
        let log = Log::default();
        let channel = EventChannel::new();
        channel.on(&recorder(&log, "a"), ListenerOptions::ordered(1));
        channel.on(
            &Listener::from_fn(|_, aborter: Aborter| {
                aborter.abort_with("enough");
                Ok(())
            }),
            ListenerOptions::ordered(2),
        );
        channel.on(&recorder(&log, "c"), ListenerOptions::ordered(3));

        let result = channel.emit(9, EmitOptions::default()).await;
        assert!(result.is_ok());
        assert_eq!(entries(&log), ["a:9"]);
    }

    #[tokio::test]
    async fn errors_do_not_stop_remaining_listeners_by_default() {
        let log = Log::default();
        let channel = EventChannel::new();
        channel.on(&failing("first"), ListenerOptions::ordered(1));
        channel.on(&recorder(&log, "b"), ListenerOptions::ordered(2));
        channel.on(&failing("second"), ListenerOptions::ordered(3));

        let result = channel.emit(1, EmitOptions::default()).await;
        assert_eq!(entries(&log), ["b:1"]);
        let Err(EventError::Listener(error)) = result else {
            panic!("expected the first error only");
        };
        assert_eq!(error.to_string(), "first");
    }

    #[tokio::test]
    async fn all_errors_are_reported_in_order() {
        let channel = EventChannel::new();
        channel.on(&failing("first"), ListenerOptions::ordered(1));
        channel.on(&failing("second"), ListenerOptions::ordered(2));

        let options = EmitOptions {
            only_throw_first_error: false,
            ..EmitOptions::default()
        };
        let Err(EventError::Listeners(errors)) = channel.emit(1, options).await else {
            panic!("expected every error");
        };
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        assert_eq!(messages, ["first", "second"]);
    }

    #[tokio::test]
    async fn abort_when_error_occurred_stops_the_cycle() {
        let log = Log::default();
        let channel = EventChannel::new();
        channel.on(&failing("stop"), ListenerOptions::ordered(1));
        channel.on(&recorder(&log, "b"), ListenerOptions::ordered(2));

        let options = EmitOptions {
            abort_when_error_occurred: true,
            ..EmitOptions::default()
        };
        assert!(channel.emit(1, options).await.is_err());
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn sync_emit_does_not_wait_for_async_remainders() {
        let log = Log::default();
        let channel = EventChannel::new();
        let slow = {
            let log = Arc::clone(&log);
            Listener::new(move |n: u32, _| {
                let log = Arc::clone(&log);
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    if let Ok(mut log) = log.lock() {
                        log.push(format!("slow:{n}"));
                    }
                    Ok(())
                }
            })
        };
        channel.on(&slow, ListenerOptions::ordered(1));
        channel.on(&recorder(&log, "fast"), ListenerOptions::ordered(2));

        let options = EmitOptions {
            sync: true,
            ..EmitOptions::default()
        };
        assert!(channel.emit(4, options).await.is_ok());
        assert_eq!(entries(&log), ["fast:4"]);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(entries(&log), ["fast:4", "slow:4"]);
    }

    #[tokio::test]
    async fn sync_emit_honours_abort_and_reports_inline_errors() {
        let log = Log::default();
        let channel = EventChannel::new();
        channel.on(
            &Listener::from_fn(|_, aborter: Aborter| {
                aborter.abort_with("stop here");
                anyhow::bail!("e1")
            }),
            ListenerOptions::ordered(1),
        );
        channel.on(&recorder(&log, "next"), ListenerOptions::ordered(2));

        let options = EmitOptions {
            sync: true,
            ..EmitOptions::default()
        };
        let Err(EventError::Listener(error)) = channel.emit(1, options).await else {
            panic!("expected the inline error");
        };
        assert_eq!(error.to_string(), "e1");
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn sync_emit_collects_errors_of_completed_listeners() {
        let log = Log::default();
        let channel = EventChannel::new();
        channel.on(&failing("first"), ListenerOptions::ordered(1));
        channel.on(&recorder(&log, "b"), ListenerOptions::ordered(2));
        channel.on(&failing("second"), ListenerOptions::ordered(3));

        let options = EmitOptions {
            sync: true,
            only_throw_first_error: false,
            ..EmitOptions::default()
        };
        let Err(EventError::Listeners(errors)) = channel.emit(2, options).await else {
            panic!("expected every inline error");
        };
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        assert_eq!(messages, ["first", "second"]);
        assert_eq!(entries(&log), ["b:2"]);
    }

    #[tokio::test]
    async fn clear_strips_metadata_for_reuse() {
        let log = Log::default();
        let first = EventChannel::new();
        let a = recorder(&log, "a");
        first.on(&a, ListenerOptions::ordered(1));

        let removed = first.clear();
        assert_eq!(removed, vec![a.clone()]);
        assert!(first.registered_listeners().is_empty());

        let second = EventChannel::new();
        second.on(&a, ListenerOptions::default());
        assert_eq!(second.order_of(&a), Some(crate::event::DEFAULT_ORDER));
    }

    #[tokio::test]
    async fn clone_is_independent() {
        let log = Log::default();
        let original = EventChannel::new();
        let a = recorder(&log, "a");
        original.on(&a, ListenerOptions::ordered(4));

        let copy = original.clone();
        assert_eq!(copy.order_of(&a), Some(4));
        copy.on(&recorder(&log, "b"), ListenerOptions::default());
        assert_eq!(original.len(), 1);
        assert_eq!(copy.len(), 2);

        assert!(original.off(&a));
        assert!(copy.contains(&a));
    }
}

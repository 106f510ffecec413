//! Named topics, each backed by its own [`EventChannel`].
//!
//! Topics keep the order in which they were declared. Derivation methods
//! ([`EventPool::clone_pool`], [`EventPool::extend`], [`EventPool::union`])
//! never touch the receiver or the argument.

use std::fmt;

use super::channel::EventChannel;
use super::listener::{Canceler, EmitOptions, Listener, ListenerOptions};
use crate::error::EventError;

/// Ordered mapping from topic to channel.
///
/// All topics share one payload type; use an enum to carry different
/// payloads per topic.
pub struct EventPool<K, T> {
    channels: Vec<(K, EventChannel<T>)>,
}

impl<K, T> EventPool<K, T>
where
    K: Clone + PartialEq + fmt::Display,
    T: Clone + Send + 'static,
{
    /// Creates a pool with one empty channel per topic. Repeated topics
    /// are declared once.
    pub fn new(topics: impl IntoIterator<Item = K>) -> Self {
        let mut pool = Self {
            channels: Vec::new(),
        };
        for topic in topics {
            if pool.channel(&topic).is_none() {
                pool.channels.push((topic, EventChannel::new()));
            }
        }
        pool
    }

    /// Channel registered for `topic`, if declared.
    #[must_use]
    pub fn channel(&self, topic: &K) -> Option<&EventChannel<T>> {
        self.channels
            .iter()
            .find(|(key, _)| key == topic)
            .map(|(_, channel)| channel)
    }

    fn require(&self, topic: &K) -> Result<&EventChannel<T>, EventError> {
        self.channel(topic)
            .ok_or_else(|| EventError::UnknownTopic(topic.to_string()))
    }

    fn set(&mut self, topic: K, channel: EventChannel<T>) {
        match self.channels.iter_mut().find(|(key, _)| *key == topic) {
            Some((_, slot)) => *slot = channel,
            None => self.channels.push((topic, channel)),
        }
    }

    /// Declared topics in declaration order.
    #[must_use]
    pub fn topics(&self) -> Vec<K> {
        self.channels.iter().map(|(key, _)| key.clone()).collect()
    }

    /// Registers `listener` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::UnknownTopic`] if `topic` was never declared.
    pub fn on(
        &self,
        topic: &K,
        listener: &Listener<T>,
        options: ListenerOptions,
    ) -> Result<Canceler, EventError> {
        Ok(self.require(topic)?.on(listener, options))
    }

    /// Registers a once-listener on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::UnknownTopic`] if `topic` was never declared.
    pub fn once(
        &self,
        topic: &K,
        listener: &Listener<T>,
        order: i64,
    ) -> Result<Canceler, EventError> {
        Ok(self.require(topic)?.once(listener, order))
    }

    /// Removes `listener` from `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::UnknownTopic`] if `topic` was never declared.
    pub fn off(&self, topic: &K, listener: &Listener<T>) -> Result<bool, EventError> {
        Ok(self.require(topic)?.off(listener))
    }

    /// Removes every listener of `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::UnknownTopic`] if `topic` was never declared.
    pub fn clear(&self, topic: &K) -> Result<Vec<Listener<T>>, EventError> {
        Ok(self.require(topic)?.clear())
    }

    /// Removes every listener of every topic. Returns `true` once all
    /// channels are empty.
    pub fn clear_all(&self) -> bool {
        self.channels.iter().all(|(_, channel)| {
            channel.clear();
            channel.is_empty()
        })
    }

    /// Emits `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::UnknownTopic`] if `topic` was never declared,
    /// otherwise whatever [`EventChannel::emit`] reports.
    pub async fn emit(
        &self,
        topic: &K,
        payload: T,
        options: EmitOptions,
    ) -> Result<(), EventError> {
        self.require(topic)?.emit(payload, options).await
    }

    /// New pool over the same topics. Channels are copied with their
    /// listeners, or left empty when `disable_inherit_listeners` is set.
    #[must_use]
    pub fn clone_pool(&self, disable_inherit_listeners: bool) -> Self {
        Self {
            channels: self
                .channels
                .iter()
                .map(|(key, channel)| {
                    let channel = if disable_inherit_listeners {
                        EventChannel::new()
                    } else {
                        channel.clone()
                    };
                    (key.clone(), channel)
                })
                .collect(),
        }
    }

    /// Clone extended with `topics`. Every listed topic gets a fresh,
    /// empty channel, including topics that were already declared.
    #[must_use]
    pub fn extend(
        &self,
        topics: impl IntoIterator<Item = K>,
        disable_inherit_listeners: bool,
    ) -> Self {
        let mut extended = self.clone_pool(disable_inherit_listeners);
        for topic in topics {
            extended.set(topic, EventChannel::new());
        }
        extended
    }

    /// Merges clones of `self` and `other`; `other` wins on shared topics.
    #[must_use]
    pub fn union(&self, other: &Self, disable_inherit_listeners: bool) -> Self {
        let mut merged = self.clone_pool(disable_inherit_listeners);
        for (key, channel) in other.clone_pool(disable_inherit_listeners).channels {
            merged.set(key, channel);
        }
        merged
    }
}

impl<K, T> Clone for EventPool<K, T>
where
    K: Clone + PartialEq + fmt::Display,
    T: Clone + Send + 'static,
{
    fn clone(&self) -> Self {
        self.clone_pool(false)
    }
}

impl<K: fmt::Debug, T> fmt::Debug for EventPool<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.channels.iter().map(|(key, channel)| (key, channel)))
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, name: &str) -> Listener<String> {
        let log = Arc::clone(log);
        let name = name.to_string();
        Listener::from_fn(move |payload: String, _| {
            if let Ok(mut log) = log.lock() {
                log.push(format!("{name}:{payload}"));
            }
            Ok(())
        })
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn pool() -> EventPool<&'static str, String> {
        EventPool::new(["change", "success"])
    }

    #[tokio::test]
    async fn emits_only_on_the_named_topic() {
        let log = Log::default();
        let pool = pool();
        let _ = pool.on(&"change", &recorder(&log, "c"), ListenerOptions::default());
        let _ = pool.on(&"success", &recorder(&log, "s"), ListenerOptions::default());

        let result = pool.emit(&"change", "1".to_string(), EmitOptions::default()).await;
        assert!(result.is_ok());
        assert_eq!(entries(&log), ["c:1"]);
    }

    #[tokio::test]
    async fn unknown_topic_is_an_error() {
        let pool = pool();
        let listener = Listener::from_fn(|_: String, _| Ok(()));
        let Err(EventError::UnknownTopic(topic)) =
            pool.on(&"missing", &listener, ListenerOptions::default())
        else {
            panic!("expected unknown topic");
        };
        assert_eq!(topic, "missing");
        assert!(
            pool.emit(&"missing", String::new(), EmitOptions::default())
                .await
                .is_err()
        );
        assert!(pool.off(&"missing", &listener).is_err());
    }

    #[test]
    fn duplicate_topics_are_declared_once() {
        let pool: EventPool<&str, String> = EventPool::new(["a", "b", "a"]);
        assert_eq!(pool.topics(), ["a", "b"]);
    }

    #[test]
    fn clear_all_empties_every_channel() {
        let log = Log::default();
        let pool = pool();
        let _ = pool.on(&"change", &recorder(&log, "c"), ListenerOptions::default());
        let _ = pool.once(&"success", &recorder(&log, "s"), 1);

        assert!(pool.clear_all());
        assert!(pool.topics().iter().all(|t| pool.channel(t).is_some_and(EventChannel::is_empty)));
    }

    #[tokio::test]
    async fn once_fires_a_single_time_on_its_topic() {
        let log = Log::default();
        let pool = pool();
        let Ok(_) = pool.once(&"success", &recorder(&log, "s"), 1) else {
            panic!("topic declared");
        };
        assert!(pool.once(&"missing", &recorder(&log, "m"), 1).is_err());

        let _ = pool.emit(&"change", "0".into(), EmitOptions::default()).await;
        let _ = pool.emit(&"success", "1".into(), EmitOptions::default()).await;
        let _ = pool.emit(&"success", "2".into(), EmitOptions::default()).await;
        assert_eq!(entries(&log), ["s:1"]);
        assert_eq!(pool.channel(&"success").map(EventChannel::len), Some(0));
    }

    #[tokio::test]
    async fn clear_empties_only_the_named_topic() {
        let log = Log::default();
        let pool = pool();
        let change = recorder(&log, "c");
        let _ = pool.on(&"change", &change, ListenerOptions::default());
        let _ = pool.on(&"success", &recorder(&log, "s"), ListenerOptions::default());

        let Ok(removed) = pool.clear(&"change") else {
            panic!("topic declared");
        };
        assert_eq!(removed, [change]);
        assert!(pool.clear(&"missing").is_err());

        let _ = pool.emit(&"change", "1".into(), EmitOptions::default()).await;
        let _ = pool.emit(&"success", "2".into(), EmitOptions::default()).await;
        assert_eq!(entries(&log), ["s:2"]);
        assert_eq!(pool.topics(), ["change", "success"]);
    }

    #[test]
    fn clone_pool_respects_inherit_flag() {
        let log = Log::default();
        let pool = pool();
        let _ = pool.on(&"change", &recorder(&log, "c"), ListenerOptions::default());

        let inherited = pool.clone_pool(false);
        let fresh = pool.clone_pool(true);
        assert_eq!(inherited.channel(&"change").map(EventChannel::len), Some(1));
        assert_eq!(fresh.channel(&"change").map(EventChannel::len), Some(0));
        assert_eq!(fresh.topics(), pool.topics());
    }

    #[tokio::test]
    async fn extend_and_union_never_mutate_sources() {
        let log = Log::default();
        let base = pool();
        let other: EventPool<&str, String> = EventPool::new(["error", "change"]);
        let _ = base.on(&"change", &recorder(&log, "base"), ListenerOptions::default());
        let _ = other.on(&"error", &recorder(&log, "other"), ListenerOptions::default());

        let merged = base.extend(["visible"], false).union(&other, false);
        assert_eq!(merged.topics(), ["change", "success", "visible", "error"]);

        let _ = merged.on(&"visible", &recorder(&log, "v"), ListenerOptions::default());
        let _ = merged.on(&"error", &recorder(&log, "merged"), ListenerOptions::default());

        assert_eq!(base.topics(), ["change", "success"]);
        assert_eq!(other.topics(), ["error", "change"]);
        assert_eq!(other.channel(&"error").map(EventChannel::len), Some(1));

        // `other` wins on the shared "change" topic, and it had no listener there.
        let _ = merged.emit(&"change", "x".into(), EmitOptions::default()).await;
        let _ = merged.emit(&"error", "y".into(), EmitOptions::default()).await;
        assert_eq!(entries(&log), ["other:y", "merged:y"]);

        let _ = base.emit(&"change", "z".into(), EmitOptions::default()).await;
        assert_eq!(entries(&log), ["other:y", "merged:y", "base:z"]);
    }

    #[test]
    fn extend_resets_existing_topics() {
        let log = Log::default();
        let pool = pool();
        let _ = pool.on(&"change", &recorder(&log, "c"), ListenerOptions::default());
        let _ = pool.on(&"success", &recorder(&log, "s"), ListenerOptions::default());

        let extended = pool.extend(["change"], false);
        assert_eq!(extended.channel(&"change").map(EventChannel::len), Some(0));
        assert_eq!(extended.channel(&"success").map(EventChannel::len), Some(1));
    }
}

//! Notification hub
//!
//! The registry (topics and their subscribers) sits behind one mutex, so
//! subscribe, unsubscribe and publish are mutually exclusive. Publish fans out
//! with `try_send` while holding the lock:
//! - every publish sees a consistent snapshot of the topic's subscribers
//! - publishes on one topic are totally ordered, so each subscriber receives
//!   them in publish order
//! - a subscriber removed before a publish takes the lock never sees it
//!
//! The lock is never held across an `.await`. A poisoned lock is recovered;
//! the registry is only mutated through small infallible steps.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chatwire_config::HubSettings;
use chatwire_utils::{ChatError, ChatResult};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace, warn};

use crate::handle::SubscriptionHandle;
use crate::topic::{SubscriberId, Topic};

pub struct NotificationHub<T> {
    pub(crate) shared: Arc<Shared<T>>,
}

pub(crate) struct Shared<T> {
    registry: Mutex<Registry<T>>,
    next_id: AtomicU64,
    max_subscribers: usize,
    buffer: usize,
}

struct Registry<T> {
    topics: HashMap<String, Topic<T>>,
    subscribers: usize,
}

impl<T> Clone for NotificationHub<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> NotificationHub<T> {
    pub const DEFAULT_BUFFER: usize = 64;
    pub const DEFAULT_MAX_SUBSCRIBERS: usize = 10_000;

    pub fn new() -> Self {
        Self::with_limits(Self::DEFAULT_MAX_SUBSCRIBERS, Self::DEFAULT_BUFFER)
    }

    /// `buffer` is the per-subscriber queue length (at least 1).
    pub fn with_limits(max_subscribers: usize, buffer: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry {
                    topics: HashMap::new(),
                    subscribers: 0,
                }),
                next_id: AtomicU64::new(1),
                max_subscribers,
                buffer: buffer.max(1),
            }),
        }
    }

    pub fn from_settings(settings: &HubSettings) -> Self {
        Self::with_limits(settings.max_subscribers, settings.subscriber_buffer)
    }

    /// Register a new subscriber on `topic`, creating the topic on first use.
    pub fn subscribe(&self, topic: &str) -> ChatResult<SubscriptionHandle<T>> {
        let mut registry = self.shared.lock();
        if registry.subscribers >= self.shared.max_subscribers {
            warn!(
                "subscriber limit {} reached, rejecting subscription to {topic}",
                self.shared.max_subscribers
            );
            return Err(ChatError::ResourceExhausted {
                limit: self.shared.max_subscribers,
            });
        }

        let id = SubscriberId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.shared.buffer);

        registry
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .subscribe(id, sender);
        registry.subscribers += 1;
        drop(registry);

        debug!("{id} subscribed to {topic}");
        Ok(SubscriptionHandle::new(
            id,
            topic.to_string(),
            receiver,
            Arc::downgrade(&self.shared),
        ))
    }

    /// Deliver `payload` to every subscriber currently on `topic` and return
    /// how many deliveries were enqueued. Never blocks: a full queue drops the
    /// delivery, a closed one is pruned from the registry.
    pub fn publish(&self, topic: &str, payload: T) -> usize {
        let mut registry = self.shared.lock();
        let Registry {
            topics,
            subscribers: total,
        } = &mut *registry;

        let Some(entry) = topics.get_mut(topic) else {
            trace!("no subscribers on {topic}");
            return 0;
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, sender) in &entry.subscribers {
            match sender.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("queue full for {id} on {topic}, dropping event");
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            if entry.unsubscribe(id) {
                *total -= 1;
                debug!("pruned closed subscriber {id} from {topic}");
            }
        }
        if entry.is_empty() {
            topics.remove(topic);
        }

        trace!("published to {topic}: {delivered} deliveries");
        delivered
    }

    /// Remove `handle` from the registry. Safe to call more than once.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle<T>) {
        self.shared.remove(handle.topic(), handle.id());
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.shared
            .lock()
            .topics
            .get(topic)
            .map_or(0, Topic::len)
    }

    pub fn total_subscribers(&self) -> usize {
        self.shared.lock().subscribers
    }

    pub fn topic_count(&self) -> usize {
        self.shared.lock().topics.len()
    }

    /// Drop every registration. Outstanding handles drain what they already
    /// hold and then end.
    pub fn shutdown(&self) {
        let mut registry = self.shared.lock();
        let released = registry.subscribers;
        registry.topics.clear();
        registry.subscribers = 0;
        drop(registry);

        debug!("hub shut down, released {released} subscribers");
    }
}

impl<T: Clone + Send + 'static> Default for NotificationHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for NotificationHub<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.shared.lock();
        f.debug_struct("NotificationHub")
            .field("topics", &registry.topics.len())
            .field("subscribers", &registry.subscribers)
            .field("max_subscribers", &self.shared.max_subscribers)
            .field("buffer", &self.shared.buffer)
            .finish()
    }
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Registry<T>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn contains(&self, topic: &str, id: SubscriberId) -> bool {
        self.lock()
            .topics
            .get(topic)
            .is_some_and(|entry| entry.contains(id))
    }

    pub(crate) fn remove(&self, topic: &str, id: SubscriberId) {
        let mut registry = self.lock();
        let Some(entry) = registry.topics.get_mut(topic) else {
            return;
        };
        if !entry.unsubscribe(id) {
            return;
        }
        if entry.is_empty() {
            registry.topics.remove(topic);
        }
        registry.subscribers -= 1;
        drop(registry);

        debug!("{id} unsubscribed from {topic}");
    }
}

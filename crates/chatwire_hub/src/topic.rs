//! Topic management
//!
//! A `Topic` maps subscriber ids to the sending half of their delivery queue.
//! Callers must synchronize access (the hub keeps every topic behind its
//! registry lock).

use std::collections::HashMap;

use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug)]
pub struct Topic<T> {
    pub name: String,
    pub subscribers: HashMap<SubscriberId, mpsc::Sender<T>>,
}

impl<T> Topic<T> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: HashMap::new(),
        }
    }

    pub fn subscribe(&mut self, id: SubscriberId, sender: mpsc::Sender<T>) {
        self.subscribers.insert(id, sender);
    }

    /// Returns whether `id` was registered.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

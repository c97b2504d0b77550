use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::hub::Shared;
use crate::topic::SubscriberId;

/// One subscriber's view of a topic.
///
/// Events arrive in publish order. After `unsubscribe` (or hub shutdown) the
/// events already queued can still be read, then the handle yields `None`.
/// Dropping the handle unsubscribes it.
pub struct SubscriptionHandle<T> {
    id: SubscriberId,
    topic: String,
    receiver: mpsc::Receiver<T>,
    hub: Weak<Shared<T>>,
}

impl<T> SubscriptionHandle<T> {
    pub(crate) fn new(
        id: SubscriberId,
        topic: String,
        receiver: mpsc::Receiver<T>,
        hub: Weak<Shared<T>>,
    ) -> Self {
        Self {
            id,
            topic,
            receiver,
            hub,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Whether the hub still delivers to this handle. False after
    /// `unsubscribe`, hub shutdown, or once the hub is gone.
    pub fn is_registered(&self) -> bool {
        self.hub
            .upgrade()
            .is_some_and(|hub| hub.contains(&self.topic, self.id))
    }

    /// Idempotent; a no-op once the hub itself is gone.
    pub fn unsubscribe(&self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(&self.topic, self.id);
        }
    }
}

impl<T> Stream for SubscriptionHandle<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl<T> Drop for SubscriptionHandle<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl<T> std::fmt::Debug for SubscriptionHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}

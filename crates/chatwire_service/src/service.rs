use std::sync::Arc;

use chatwire_auth::Identity;
use chatwire_hub::{NotificationHub, SubscriptionHandle};
use chatwire_store::{Message, MessageStore};
use chatwire_utils::{ChatError, ChatResult};
use tracing::{debug, info};

/// Topic carrying every newly created message.
pub const MESSAGE_ADDED: &str = "message_added";

#[derive(Debug, Clone)]
pub struct ChatService {
    store: Arc<dyn MessageStore>,
    hub: NotificationHub<Message>,
}

impl ChatService {
    pub fn new(store: Arc<dyn MessageStore>, hub: NotificationHub<Message>) -> Self {
        Self { store, hub }
    }

    pub fn hub(&self) -> &NotificationHub<Message> {
        &self.hub
    }

    pub fn create_message(&self, identity: Option<&Identity>, text: &str) -> ChatResult<Message> {
        let identity = require_auth(identity)?;

        let id = self.store.append(&identity.user_id, text)?;
        let message = self.store.get(id)?;

        let delivered = self.hub.publish(MESSAGE_ADDED, message.clone());
        info!(
            "{} created message {} ({delivered} live subscribers notified)",
            identity.user_id, message.id
        );

        Ok(message)
    }

    pub fn list_messages(&self, identity: Option<&Identity>) -> ChatResult<Vec<Message>> {
        require_auth(identity)?;
        self.store.list()
    }

    /// The handle yields each message created after this call returns, until
    /// it is unsubscribed or dropped.
    pub fn subscribe_to_message_added(
        &self,
        identity: Option<&Identity>,
    ) -> ChatResult<SubscriptionHandle<Message>> {
        let identity = require_auth(identity)?;
        let handle = self.hub.subscribe(MESSAGE_ADDED)?;
        debug!("{} subscribed to {MESSAGE_ADDED} as {}", identity.user_id, handle.id());
        Ok(handle)
    }
}

fn require_auth(identity: Option<&Identity>) -> ChatResult<&Identity> {
    match identity {
        Some(identity) if !identity.user_id.is_empty() => Ok(identity),
        _ => Err(ChatError::unauthorized("missing identity")),
    }
}

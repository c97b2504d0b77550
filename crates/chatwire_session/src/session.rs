use std::sync::Arc;

use chatwire_auth::{Identity, TokenValidator};
use chatwire_hub::SubscriptionHandle;
use chatwire_service::ChatService;
use chatwire_store::Message;
use chatwire_utils::{ChatError, ChatResult};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Subscribed,
    Closed,
}

pub struct Session {
    id: String,
    state: SessionState,
    identity: Option<Identity>,
    service: ChatService,
    validator: Arc<dyn TokenValidator>,
    subscription: Option<SubscriptionHandle<Message>>,
}

impl Session {
    pub fn new(service: ChatService, validator: Arc<dyn TokenValidator>) -> Self {
        Self {
            id: format!("session-{}", Uuid::new_v4()),
            state: SessionState::Unauthenticated,
            identity: None,
            service,
            validator,
            subscription: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Validate `token` and adopt its identity. A rejected token closes the
    /// session.
    pub fn authenticate(&mut self, token: &str) -> ChatResult<&Identity> {
        self.ensure_open()?;

        match self.validator.validate(token) {
            Ok(identity) => {
                info!("{} authenticated as {}", self.id, identity.user_id);
                if self.state == SessionState::Unauthenticated {
                    self.state = SessionState::Authenticated;
                }
                Ok(self.identity.insert(identity))
            }
            Err(e) => {
                warn!("{} authentication failed: {e}", self.id);
                self.close();
                Err(e)
            }
        }
    }

    /// Start receiving new messages. Subscribing again keeps the existing
    /// registration.
    pub fn subscribe_message_added(&mut self) -> ChatResult<()> {
        self.ensure_open()?;
        if let Some(handle) = &self.subscription {
            if handle.is_registered() {
                return Ok(());
            }
            // released by the hub (shutdown) before next_event noticed
            debug!("{} replacing ended subscription {}", self.id, handle.id());
            self.subscription = None;
        }

        let handle = self
            .service
            .subscribe_to_message_added(self.identity.as_ref())?;
        debug!("{} subscribed as {}", self.id, handle.id());
        self.subscription = Some(handle);
        self.state = SessionState::Subscribed;
        Ok(())
    }

    pub fn unsubscribe_message_added(&mut self) -> ChatResult<()> {
        self.ensure_open()?;
        if let Some(handle) = self.subscription.take() {
            handle.unsubscribe();
            debug!("{} unsubscribed", self.id);
        }
        if self.state == SessionState::Subscribed {
            self.state = SessionState::Authenticated;
        }
        Ok(())
    }

    pub fn create_message(&self, text: &str) -> ChatResult<Message> {
        self.ensure_open()?;
        self.service.create_message(self.identity.as_ref(), text)
    }

    pub fn list_messages(&self) -> ChatResult<Vec<Message>> {
        self.ensure_open()?;
        self.service.list_messages(self.identity.as_ref())
    }

    /// Next delivered message, in arrival order. Never resolves while the
    /// session holds no subscription, so it can sit in a `select!` next to
    /// the transport's reader. Cancel-safe.
    pub async fn next_event(&mut self) -> Message {
        loop {
            let Some(handle) = self.subscription.as_mut() else {
                return std::future::pending().await;
            };
            if let Some(message) = handle.recv().await {
                return message;
            }

            // the hub released us (shutdown)
            debug!("{} subscription ended by hub", self.id);
            self.subscription = None;
            if self.state == SessionState::Subscribed {
                self.state = SessionState::Authenticated;
            }
        }
    }

    /// Release every hub registration. Idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Some(handle) = self.subscription.take() {
            handle.unsubscribe();
        }
        self.identity = None;
        self.state = SessionState::Closed;
        info!("{} closed", self.id);
    }

    fn ensure_open(&self) -> ChatResult<()> {
        if self.state == SessionState::Closed {
            return Err(ChatError::unauthorized("session closed"));
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chatwire_utils::{ChatError, ChatResult};

use crate::{Message, MessageId, MessageStore};

/// In-process store. Ids start at 1 and increase by one per append.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    messages: BTreeMap<MessageId, Message>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MessageStore for MemoryStore {
    fn append(&self, author: &str, text: &str) -> ChatResult<MessageId> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = MessageId(inner.next_id);
        inner.messages.insert(
            id,
            Message {
                id,
                from: author.to_string(),
                text: text.to_string(),
                created_at: chrono::Utc::now().timestamp_millis(),
            },
        );
        Ok(id)
    }

    fn get(&self, id: MessageId) -> ChatResult<Message> {
        self.lock()
            .messages
            .get(&id)
            .cloned()
            .ok_or_else(|| ChatError::NotFound(format!("message {id}")))
    }

    fn list(&self) -> ChatResult<Vec<Message>> {
        Ok(self.lock().messages.values().cloned().collect())
    }
}

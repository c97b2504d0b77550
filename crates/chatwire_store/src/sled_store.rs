//! Persistence layer backed by `sled`
//!
//! Messages live in a single `messages` tree. Ids come from
//! `Db::generate_id`, which is monotonic across restarts, and keys are the
//! big-endian id bytes so a tree scan yields creation order. Values are
//! JSON-encoded `Message`s. A record that fails to decode is a
//! `Serialization` error for both `get` and `list`.
//!
//! Each append is flushed before it returns. The flush blocks the calling
//! thread, which is a tokio worker when called from a connection task.

use chrono::Utc;
use sled::{Db, Tree};
use tracing::{debug, warn};

use chatwire_utils::{ChatError, ChatResult};

use crate::{Message, MessageId, MessageStore};

const MESSAGES_TREE: &str = "messages";

#[derive(Clone)]
pub struct SledStore {
    db: Db,
    messages: Tree,
}

impl SledStore {
    /// Open or create a sled database at `path`.
    pub fn open(path: &str) -> ChatResult<Self> {
        let db = sled::open(path).map_err(ChatError::storage)?;
        let messages = db.open_tree(MESSAGES_TREE).map_err(ChatError::storage)?;
        debug!("opened sled store at {path}");
        Ok(Self { db, messages })
    }
}

impl MessageStore for SledStore {
    fn append(&self, author: &str, text: &str) -> ChatResult<MessageId> {
        // generate_id starts at 0; keep ids 1-based like the memory store.
        let id = MessageId(self.db.generate_id().map_err(ChatError::storage)? + 1);
        let message = Message {
            id,
            from: author.to_string(),
            text: text.to_string(),
            created_at: Utc::now().timestamp_millis(),
        };
        let value = serde_json::to_vec(&message)?;

        self.messages
            .insert(id.0.to_be_bytes(), value)
            .map_err(ChatError::storage)?;
        self.messages.flush().map_err(ChatError::storage)?;

        Ok(id)
    }

    fn get(&self, id: MessageId) -> ChatResult<Message> {
        match self
            .messages
            .get(id.0.to_be_bytes())
            .map_err(ChatError::storage)?
        {
            Some(value) => Ok(serde_json::from_slice(&value)?),
            None => Err(ChatError::NotFound(format!("message {id}"))),
        }
    }

    fn list(&self) -> ChatResult<Vec<Message>> {
        let mut messages = Vec::with_capacity(self.messages.len());
        for entry in self.messages.iter() {
            let (key, value) = entry.map_err(ChatError::storage)?;
            let message: Message = serde_json::from_slice(&value).inspect_err(|e| {
                warn!("unreadable message at key {key:?}: {e}");
            })?;
            messages.push(message);
        }
        Ok(messages)
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("db", &"sled::Db")
            .field("messages", &self.messages.len())
            .finish()
    }
}

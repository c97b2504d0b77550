//! chatwire_store
//!
//! The message store: an append-only list of chat messages. `MessageStore`
//! is the seam the service writes through; `MemoryStore` keeps everything in
//! process, `SledStore` persists to a `sled` database.

pub mod memory;
pub mod message;
pub mod sled_store;


use std::sync::Arc;

use chatwire_config::{StoreBackend, StoreSettings};
use chatwire_utils::ChatResult;

pub use memory::MemoryStore;
pub use message::{Message, MessageId};
pub use sled_store::SledStore;

pub trait MessageStore: Send + Sync + std::fmt::Debug {
    /// Persist a new message and return its generated id. The message is
    /// readable through `get` as soon as this returns.
    fn append(&self, author: &str, text: &str) -> ChatResult<MessageId>;

    /// Fails with `ChatError::NotFound` when `id` was never appended.
    fn get(&self, id: MessageId) -> ChatResult<Message>;

    /// All messages in creation order.
    fn list(&self) -> ChatResult<Vec<Message>>;
}

/// Build the store selected by configuration.
pub fn open_store(settings: &StoreSettings) -> ChatResult<Arc<dyn MessageStore>> {
    match settings.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Sled => Ok(Arc::new(SledStore::open(&settings.path)?)),
    }
}

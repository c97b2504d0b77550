//! chatwire_service
//!
//! The three entry points the transport layer calls: create a message, list
//! messages, and subscribe to new messages. Each takes the caller's identity
//! explicitly and rejects a missing one with `ChatError::Unauthorized`.
//!
//! Creating a message persists it first and publishes it second, so a
//! subscriber reacting to the event can always fetch the message by id.
//! Publishing is best-effort and never fails the write.

pub mod service;

pub use service::{ChatService, MESSAGE_ADDED};

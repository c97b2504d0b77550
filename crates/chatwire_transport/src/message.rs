//! Wire protocol
//!
//! Every frame is a JSON object tagged by `type`. Clients log in (or bring a
//! token from elsewhere), authenticate, then subscribe and post. The server
//! pushes `message_added` for every new message while the connection is
//! subscribed.

use chatwire_store::Message;
use chatwire_utils::ChatError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "login")]
    Login { username: String, password: String },
    #[serde(rename = "auth")]
    Auth { token: String },
    #[serde(rename = "subscribe")]
    Subscribe,
    #[serde(rename = "unsubscribe")]
    Unsubscribe,
    #[serde(rename = "add_message")]
    AddMessage { text: String },
    #[serde(rename = "list_messages")]
    ListMessages,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "login_response")]
    LoginResponse { token: String },
    #[serde(rename = "authenticated")]
    Authenticated { user_id: String },
    #[serde(rename = "subscribed")]
    Subscribed {},
    #[serde(rename = "unsubscribed")]
    Unsubscribed {},
    #[serde(rename = "message_created")]
    MessageCreated { message: Message },
    #[serde(rename = "messages")]
    Messages { messages: Vec<Message> },
    #[serde(rename = "message_added")]
    MessageAdded { message: Message },
    #[serde(rename = "error")]
    Error { kind: String, message: String },
}

impl ServerMessage {
    pub const BAD_REQUEST: &'static str = "bad_request";

    pub fn error(kind: &str, message: impl Into<String>) -> Self {
        Self::Error {
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}

impl From<&ChatError> for ServerMessage {
    fn from(err: &ChatError) -> Self {
        Self::error(err.kind(), err.to_string())
    }
}

use std::collections::HashMap;

use chatwire_utils::{ChatError, ChatResult};
use tracing::warn;

use crate::Identity;

/// Username/password pairs allowed to log in.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: HashMap<String, String>,
}

impl UserDirectory {
    pub fn new(users: HashMap<String, String>) -> Self {
        Self { users }
    }

    pub fn login(&self, username: &str, password: &str) -> ChatResult<Identity> {
        match self.users.get(username) {
            Some(expected) if expected == password => Ok(Identity::new(username)),
            _ => {
                warn!("login rejected for {username}");
                Err(ChatError::unauthorized("invalid credentials"))
            }
        }
    }
}

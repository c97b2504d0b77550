//! chatwire_auth
//!
//! Token validation and login. The rest of the workspace only sees the
//! `TokenValidator` trait and the `Identity` it yields; `JwtValidator` is the
//! HS256 implementation the server wires in.

pub mod jwt;
pub mod users;


use chatwire_utils::ChatResult;
use serde::{Deserialize, Serialize};

pub use jwt::{Claims, JwtValidator};
pub use users::UserDirectory;

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Verifies an opaque credential.
pub trait TokenValidator: Send + Sync {
    /// Fails with `ChatError::Unauthorized` when the token is not acceptable.
    fn validate(&self, token: &str) -> ChatResult<Identity>;
}

impl<V: TokenValidator + ?Sized> TokenValidator for std::sync::Arc<V> {
    fn validate(&self, token: &str) -> ChatResult<Identity> {
        (**self).validate(token)
    }
}

//! HS256 JSON Web Tokens
//!
//! Tokens carry the user id in `sub` and an expiry in `exp`. The secret comes
//! from `auth.jwt_secret`; rotate it by restarting with a new value, which
//! invalidates every outstanding token.

use chatwire_config::AuthSettings;
use chatwire_utils::{ChatError, ChatResult};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Identity, TokenValidator};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Longer lifetimes are clamped to this.
const MAX_TTL_SECS: i64 = 100 * 365 * 24 * 60 * 60;

pub struct JwtValidator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: chrono::Duration,
}

impl JwtValidator {
    pub fn new(secret: &[u8], ttl_secs: u64) -> Self {
        let ttl_secs = i64::try_from(ttl_secs)
            .unwrap_or(MAX_TTL_SECS)
            .min(MAX_TTL_SECS);
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            ttl: chrono::Duration::seconds(ttl_secs),
        }
    }

    pub fn from_settings(settings: &AuthSettings) -> Self {
        Self::new(settings.jwt_secret.as_bytes(), settings.token_ttl_secs)
    }

    /// Sign a token for `user_id`.
    pub fn issue(&self, user_id: &str) -> ChatResult<String> {
        let exp = (chrono::Utc::now() + self.ttl).timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: usize::try_from(exp).unwrap_or(0),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ChatError::unauthorized(format!("cannot sign token: {e}")))
    }
}

impl TokenValidator for JwtValidator {
    fn validate(&self, token: &str) -> ChatResult<Identity> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!("token rejected: {e}");
            ChatError::unauthorized("invalid token")
        })?;

        if data.claims.sub.is_empty() {
            return Err(ChatError::unauthorized("token has no subject"));
        }

        Ok(Identity::new(data.claims.sub))
    }
}

impl std::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtValidator")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

//! Error taxonomy
//!
//! Every failure that crosses a request or session boundary is a `ChatError`.
//! A failing request or session never affects another one, so callers turn
//! these into a rejected operation rather than tearing down the process.

use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Missing or invalid identity on an entry point that requires one.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The subscriber registry (or connection pool) is at capacity.
    #[error("resource exhausted: limit of {limit} reached")]
    ResourceExhausted { limit: usize },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ChatError {
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized(reason.into())
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    /// Stable code used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::ResourceExhausted { .. } => "resource_exhausted",
            Self::Storage(_) => "storage",
            Self::Serialization(_) => "serialization",
        }
    }
}

//! chatwire_utils
//!
//! Pieces shared by every chatwire crate: the error taxonomy surfaced at
//! request and session boundaries, and tracing initialisation.

pub mod error;
pub mod logging;

pub use error::{ChatError, ChatResult};

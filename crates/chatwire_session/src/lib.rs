//! chatwire_session
//!
//! A `Session` is the server-side state of one live connection. It starts
//! unauthenticated, becomes authenticated once a token validates, holds a hub
//! registration while subscribed, and releases everything when closed.
//!
//! ```text
//! Unauthenticated --auth ok--> Authenticated --subscribe--> Subscribed
//!        |                          ^                           |
//!        |                          +-------unsubscribe---------+
//!        +--auth failed / close--> Closed <------ close --------+
//! ```

pub mod session;

pub use session::{Session, SessionState};

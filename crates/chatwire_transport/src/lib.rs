pub mod message;
pub mod websocket;

#[cfg(test)]
mod websocket_tests;

pub use message::{ClientMessage, ServerMessage};
pub use websocket::{
    DEFAULT_HANDSHAKE_TIMEOUT, OUTBOUND_BUFFER, ServerContext, serve, start_websocket_server,
};

//! WebSocket transport
//!
//! Translates protocol frames into session operations. Responsibilities:
//! - accept TCP/WebSocket connections, at most `server.max_connections` at once
//! - give each connection its own `Session`
//! - forward hub deliveries to the socket while reading client frames
//! - close the session (and with it every hub registration) on disconnect
//!
//! A failed `auth` ends the connection. Any other rejected operation is
//! answered with an `error` frame and the connection stays up.
//!
//! The outbound queue is bounded. Hub deliveries are only taken from the
//! session while the queue has room, so a peer that stops reading backs up
//! into its hub buffer and further deliveries to it are dropped there.

use std::sync::Arc;
use std::time::Duration;

use chatwire_auth::{JwtValidator, TokenValidator, UserDirectory};
use chatwire_config::Settings;
use chatwire_service::ChatService;
use chatwire_session::{Session, SessionState};
use chatwire_utils::{ChatError, ChatResult};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::message::{ClientMessage, ServerMessage};

/// Frames queued for one connection's writer.
pub const OUTBOUND_BUFFER: usize = 32;
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a connection needs, shared by all of them.
#[derive(Debug)]
pub struct ServerContext {
    pub service: ChatService,
    pub validator: Arc<JwtValidator>,
    pub users: UserDirectory,
    pub max_connections: usize,
    handshake_timeout: Duration,
    connections: Arc<Semaphore>,
}

impl ServerContext {
    pub fn new(
        service: ChatService,
        validator: Arc<JwtValidator>,
        users: UserDirectory,
        max_connections: usize,
    ) -> Self {
        Self {
            service,
            validator,
            users,
            max_connections,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            connections: Arc::new(Semaphore::new(max_connections)),
        }
    }

    /// Peers that have not completed the WebSocket handshake within `limit`
    /// are dropped.
    pub fn with_handshake_timeout(mut self, limit: Duration) -> Self {
        self.handshake_timeout = limit;
        self
    }

    pub fn from_settings(service: ChatService, settings: &Settings) -> Self {
        Self::new(
            service,
            Arc::new(JwtValidator::from_settings(&settings.auth)),
            UserDirectory::new(settings.auth.users.clone()),
            settings.server.max_connections,
        )
    }

    pub fn active_connections(&self) -> usize {
        self.max_connections - self.connections.available_permits()
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

pub async fn start_websocket_server(addr: &str, ctx: Arc<ServerContext>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, ctx).await
}

/// Accept connections on `listener` until accepting fails.
pub async fn serve(listener: TcpListener, ctx: Arc<ServerContext>) -> std::io::Result<()> {
    info!("WebSocket server listening on ws://{}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;
        debug!("accepted connection from {peer}");

        match ctx.connections.clone().try_acquire_owned() {
            Ok(permit) => {
                let ctx = ctx.clone();
                spawn(async move {
                    handle_connection(stream, ctx).await;
                    drop(permit);
                });
            }
            Err(_) => {
                warn!("connection limit {} reached, rejecting {peer}", ctx.max_connections);
                spawn(reject_connection(stream, ctx.clone()));
            }
        }
    }
}

async fn handshake(stream: TcpStream, limit: Duration) -> Option<WebSocketStream<TcpStream>> {
    match timeout(limit, accept_async(stream)).await {
        Ok(Ok(ws)) => Some(ws),
        Ok(Err(e)) => {
            error!("WebSocket handshake error: {e}");
            None
        }
        Err(_) => {
            warn!("WebSocket handshake timed out after {limit:?}");
            None
        }
    }
}

async fn reject_connection(stream: TcpStream, ctx: Arc<ServerContext>) {
    let Some(mut ws_stream) = handshake(stream, ctx.handshake_timeout).await else {
        return;
    };

    let reply = ServerMessage::from(&ChatError::ResourceExhausted {
        limit: ctx.max_connections,
    });
    if let Some(frame) = encode(&reply) {
        let _ = ws_stream.send(frame).await;
    }
    let _ = ws_stream.close(None).await;
}

async fn handle_connection(stream: TcpStream, ctx: Arc<ServerContext>) {
    let Some(ws_stream) = handshake(stream, ctx.handshake_timeout).await else {
        return;
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::channel::<WsMessage>(OUTBOUND_BUFFER);

    let validator: Arc<dyn TokenValidator> = ctx.validator.clone();
    let mut session = Session::new(ctx.service.clone(), validator);
    let session_id = session.id().to_string();
    info!("{session_id} connected");

    let send_loop = {
        let session_id = session_id.clone();
        spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = ws_sender.send(msg).await {
                    warn!("Failed to send message to {session_id}: {e}");
                    break;
                }
            }
            let _ = ws_sender.close().await;
            debug!("Send loop closed for {session_id}");
        })
    };

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => {
                let text = match incoming {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("{session_id} read error: {e}");
                        break;
                    }
                };
                if handle_frame(&ctx, &mut session, text.as_str(), &tx).await == Flow::Close {
                    break;
                }
            }
            delivery = async {
                let permit = tx.reserve().await.ok()?;
                let message = session.next_event().await;
                Some((permit, message))
            } => {
                // the writer is gone
                let Some((permit, message)) = delivery else { break };
                if let Some(frame) = encode(&ServerMessage::MessageAdded { message }) {
                    permit.send(frame);
                }
            }
        }
    }

    session.close();
    drop(tx);
    if let Err(e) = send_loop.await {
        error!("send loop for {session_id} panicked: {e}");
    }
    info!("{session_id} disconnected");
}

async fn handle_frame(
    ctx: &ServerContext,
    session: &mut Session,
    text: &str,
    tx: &mpsc::Sender<WsMessage>,
) -> Flow {
    let request = match serde_json::from_str::<ClientMessage>(text) {
        Ok(request) => request,
        Err(err) => {
            warn!(
                "Invalid client message from {}: {err} | {}",
                session.id(),
                text.chars().take(100).collect::<String>()
            );
            push(tx, &ServerMessage::error(ServerMessage::BAD_REQUEST, err.to_string())).await;
            return Flow::Continue;
        }
    };

    match dispatch(ctx, session, request) {
        Ok(reply) => {
            push(tx, &reply).await;
            Flow::Continue
        }
        Err(e) => {
            debug!("{} request rejected: {e}", session.id());
            push(tx, &ServerMessage::from(&e)).await;
            if session.state() == SessionState::Closed {
                Flow::Close
            } else {
                Flow::Continue
            }
        }
    }
}

fn dispatch(
    ctx: &ServerContext,
    session: &mut Session,
    request: ClientMessage,
) -> ChatResult<ServerMessage> {
    match request {
        ClientMessage::Login { username, password } => {
            let identity = ctx.users.login(&username, &password)?;
            let token = ctx.validator.issue(&identity.user_id)?;
            Ok(ServerMessage::LoginResponse { token })
        }
        ClientMessage::Auth { token } => {
            let identity = session.authenticate(&token)?;
            Ok(ServerMessage::Authenticated {
                user_id: identity.user_id.clone(),
            })
        }
        ClientMessage::Subscribe => {
            session.subscribe_message_added()?;
            Ok(ServerMessage::Subscribed {})
        }
        ClientMessage::Unsubscribe => {
            session.unsubscribe_message_added()?;
            Ok(ServerMessage::Unsubscribed {})
        }
        ClientMessage::AddMessage { text } => {
            let message = session.create_message(&text)?;
            Ok(ServerMessage::MessageCreated { message })
        }
        ClientMessage::ListMessages => {
            let messages = session.list_messages()?;
            Ok(ServerMessage::Messages { messages })
        }
    }
}

fn encode(msg: &ServerMessage) -> Option<WsMessage> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(WsMessage::text(json)),
        Err(e) => {
            error!("Failed to serialize server message: {e}");
            None
        }
    }
}

/// Replies wait for queue space, so a client that sends without reading is
/// slowed down rather than buffered.
async fn push(tx: &mpsc::Sender<WsMessage>, msg: &ServerMessage) {
    if let Some(frame) = encode(msg) {
        // the send loop is gone once the socket failed; nothing left to tell
        let _ = tx.send(frame).await;
    }
}

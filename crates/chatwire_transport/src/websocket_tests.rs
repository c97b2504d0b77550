use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chatwire_auth::{JwtValidator, UserDirectory};
use chatwire_hub::NotificationHub;
use chatwire_service::{ChatService, MESSAGE_ADDED};
use chatwire_store::{MemoryStore, Message, MessageId};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::message::ServerMessage;
use crate::websocket::{DEFAULT_HANDSHAKE_TIMEOUT, ServerContext, serve};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    url: String,
    ctx: Arc<ServerContext>,
}

async fn start_server(max_connections: usize) -> TestServer {
    start_server_with(max_connections, NotificationHub::new(), DEFAULT_HANDSHAKE_TIMEOUT).await
}

async fn start_server_with(
    max_connections: usize,
    hub: NotificationHub<Message>,
    handshake_timeout: Duration,
) -> TestServer {
    let service = ChatService::new(Arc::new(MemoryStore::new()), hub);
    let users = UserDirectory::new(HashMap::from([
        ("admin".to_string(), "password".to_string()),
        ("alice".to_string(), "wonderland".to_string()),
    ]));
    let ctx = Arc::new(
        ServerContext::new(
            service,
            Arc::new(JwtValidator::new(b"test-secret", 3600)),
            users,
            max_connections,
        )
        .with_handshake_timeout(handshake_timeout),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("ws://{}", listener.local_addr().expect("local addr"));
    tokio::spawn(serve(listener, ctx.clone()));

    TestServer { url, ctx }
}

async fn connect(server: &TestServer) -> Client {
    let (ws, _) = connect_async(server.url.as_str())
        .await
        .expect("WebSocket handshake failed");
    ws
}

async fn send(ws: &mut Client, value: serde_json::Value) {
    ws.send(WsMessage::text(value.to_string()))
        .await
        .expect("Failed to send message");
}

async fn recv(ws: &mut Client) -> ServerMessage {
    loop {
        let frame = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for server")
            .expect("connection closed")
            .expect("read error");
        if let WsMessage::Text(text) = frame {
            let text = text.as_str();
            return serde_json::from_str(text).unwrap_or_else(|e| {
                panic!("Failed to deserialize ServerMessage from '{text}': {e}")
            });
        }
    }
}

async fn expect_closed(ws: &mut Client) {
    loop {
        match timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("connection stayed open")
        {
            Some(Ok(WsMessage::Text(text))) => panic!("unexpected frame after close: {text:?}"),
            Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => return,
            Some(Ok(_)) => continue,
        }
    }
}

async fn expect_silence(ws: &mut Client) {
    if let Ok(Some(Ok(frame))) = timeout(Duration::from_millis(100), ws.next()).await {
        panic!("expected no frame, got {frame:?}");
    }
}

async fn login(ws: &mut Client, username: &str, password: &str) -> String {
    send(
        ws,
        json!({"type": "login", "username": username, "password": password}),
    )
    .await;
    match recv(ws).await {
        ServerMessage::LoginResponse { token } => token,
        other => panic!("Expected LoginResponse, got {other:?}"),
    }
}

/// login + auth, returns the authenticated client.
async fn authed_client(server: &TestServer, username: &str, password: &str) -> Client {
    let mut ws = connect(server).await;
    let token = login(&mut ws, username, password).await;
    send(&mut ws, json!({"type": "auth", "token": token})).await;
    match recv(&mut ws).await {
        ServerMessage::Authenticated { user_id } => assert_eq!(user_id, username),
        other => panic!("Expected Authenticated, got {other:?}"),
    }
    ws
}

async fn wait_for_subscribers(server: &TestServer, expected: usize) {
    for _ in 0..100 {
        if server.ctx.service.hub().subscriber_count(MESSAGE_ADDED) == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {expected} subscribers, found {}",
        server.ctx.service.hub().subscriber_count(MESSAGE_ADDED)
    );
}

#[tokio::test]
async fn test_login_success() {
    let server = start_server(10).await;
    let _ws = authed_client(&server, "admin", "password").await;
}

#[tokio::test]
async fn test_login_failure() {
    let server = start_server(10).await;
    let mut ws = connect(&server).await;

    send(
        &mut ws,
        json!({"type": "login", "username": "wrong_user", "password": "wrong_password"}),
    )
    .await;

    match recv(&mut ws).await {
        ServerMessage::Error { kind, message } => {
            assert_eq!(kind, "unauthorized");
            assert_eq!(message, "unauthorized: invalid credentials");
        }
        other => panic!("Expected Error, got {other:?}"),
    }

    // a failed login does not end the connection
    let _token = login(&mut ws, "alice", "wonderland").await;
}

#[tokio::test]
async fn test_auth_failure_closes_connection() {
    let server = start_server(10).await;
    let mut ws = connect(&server).await;

    send(&mut ws, json!({"type": "auth", "token": "invalid.token.here"})).await;

    match recv(&mut ws).await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, "unauthorized"),
        other => panic!("Expected Error, got {other:?}"),
    }
    expect_closed(&mut ws).await;
}

#[tokio::test]
async fn test_subscribe_before_auth_is_rejected() {
    let server = start_server(10).await;
    let mut ws = connect(&server).await;

    send(&mut ws, json!({"type": "subscribe"})).await;
    match recv(&mut ws).await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, "unauthorized"),
        other => panic!("Expected Error, got {other:?}"),
    }
    assert_eq!(server.ctx.service.hub().subscriber_count(MESSAGE_ADDED), 0);

    send(&mut ws, json!({"type": "add_message", "text": "sneaky"})).await;
    match recv(&mut ws).await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, "unauthorized"),
        other => panic!("Expected Error, got {other:?}"),
    }

    // the connection is still usable
    let token = login(&mut ws, "admin", "password").await;
    send(&mut ws, json!({"type": "auth", "token": token})).await;
    assert!(matches!(
        recv(&mut ws).await,
        ServerMessage::Authenticated { .. }
    ));
}

#[tokio::test]
async fn test_bad_frame_is_reported() {
    let server = start_server(10).await;
    let mut ws = connect(&server).await;

    ws.send(WsMessage::text("{\"type\": \"shout\"}")).await.unwrap();
    match recv(&mut ws).await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, ServerMessage::BAD_REQUEST),
        other => panic!("Expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_subscriber_receives_new_message_once() {
    let server = start_server(10).await;
    let mut listener = authed_client(&server, "alice", "wonderland").await;
    let mut writer = authed_client(&server, "admin", "password").await;

    send(&mut listener, json!({"type": "subscribe"})).await;
    assert!(matches!(recv(&mut listener).await, ServerMessage::Subscribed {}));

    send(&mut writer, json!({"type": "add_message", "text": "hi"})).await;
    let created = match recv(&mut writer).await {
        ServerMessage::MessageCreated { message } => message,
        other => panic!("Expected MessageCreated, got {other:?}"),
    };
    assert_eq!(created.from, "admin");
    assert_eq!(created.text, "hi");

    match recv(&mut listener).await {
        ServerMessage::MessageAdded { message } => assert_eq!(message, created),
        other => panic!("Expected MessageAdded, got {other:?}"),
    }
    expect_silence(&mut listener).await;
    // the writer is not subscribed
    expect_silence(&mut writer).await;
}

#[tokio::test]
async fn test_own_messages_arrive_in_order() {
    let server = start_server(10).await;
    let mut ws = authed_client(&server, "alice", "wonderland").await;

    send(&mut ws, json!({"type": "subscribe"})).await;
    assert!(matches!(recv(&mut ws).await, ServerMessage::Subscribed {}));

    for text in ["one", "two", "three"] {
        send(&mut ws, json!({"type": "add_message", "text": text})).await;
    }

    let mut created = Vec::new();
    let mut added = Vec::new();
    while added.len() < 3 || created.len() < 3 {
        match recv(&mut ws).await {
            ServerMessage::MessageCreated { message } => created.push(message.text),
            ServerMessage::MessageAdded { message } => added.push(message.text),
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(created, vec!["one", "two", "three"]);
    assert_eq!(added, vec!["one", "two", "three"]);
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let server = start_server(10).await;
    let mut listener = authed_client(&server, "alice", "wonderland").await;
    let mut writer = authed_client(&server, "admin", "password").await;

    send(&mut listener, json!({"type": "subscribe"})).await;
    assert!(matches!(recv(&mut listener).await, ServerMessage::Subscribed {}));
    send(&mut listener, json!({"type": "unsubscribe"})).await;
    assert!(matches!(recv(&mut listener).await, ServerMessage::Unsubscribed {}));

    send(&mut writer, json!({"type": "add_message", "text": "unheard"})).await;
    assert!(matches!(
        recv(&mut writer).await,
        ServerMessage::MessageCreated { .. }
    ));
    expect_silence(&mut listener).await;
}

#[tokio::test]
async fn test_list_messages_round_trip() {
    let server = start_server(10).await;
    let mut ws = authed_client(&server, "admin", "password").await;

    send(&mut ws, json!({"type": "add_message", "text": "first"})).await;
    let first = match recv(&mut ws).await {
        ServerMessage::MessageCreated { message } => message,
        other => panic!("Expected MessageCreated, got {other:?}"),
    };

    send(&mut ws, json!({"type": "list_messages"})).await;
    match recv(&mut ws).await {
        ServerMessage::Messages { messages } => assert_eq!(messages, vec![first]),
        other => panic!("Expected Messages, got {other:?}"),
    }
}

#[tokio::test]
async fn test_disconnect_releases_subscription() {
    let server = start_server(10).await;
    let mut ws = authed_client(&server, "alice", "wonderland").await;

    send(&mut ws, json!({"type": "subscribe"})).await;
    assert!(matches!(recv(&mut ws).await, ServerMessage::Subscribed {}));
    wait_for_subscribers(&server, 1).await;

    ws.close(None).await.expect("Failed to close WebSocket");
    drop(ws);

    wait_for_subscribers(&server, 0).await;
}

#[tokio::test]
async fn test_connection_limit() {
    let server = start_server(1).await;
    let _first = authed_client(&server, "admin", "password").await;

    let mut second = connect(&server).await;
    match recv(&mut second).await {
        ServerMessage::Error { kind, .. } => assert_eq!(kind, "resource_exhausted"),
        other => panic!("Expected Error, got {other:?}"),
    }
    expect_closed(&mut second).await;
    assert_eq!(server.ctx.active_connections(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stalled_reader_backs_up_into_hub_buffer() {
    let hub = NotificationHub::with_limits(100, 4);
    let server = start_server_with(10, hub, DEFAULT_HANDSHAKE_TIMEOUT).await;
    let mut ws = authed_client(&server, "alice", "wonderland").await;
    send(&mut ws, json!({"type": "subscribe"})).await;
    assert!(matches!(recv(&mut ws).await, ServerMessage::Subscribed {}));
    wait_for_subscribers(&server, 1).await;

    // the client never reads again
    let hub = server.ctx.service.hub();
    let message = Message {
        id: MessageId(1),
        from: "bulk".to_string(),
        text: "x".repeat(64 * 1024),
        created_at: 0,
    };
    let attempts = 1000;
    let mut delivered = 0;
    for i in 0..attempts {
        delivered += hub.publish(MESSAGE_ADDED, message.clone());
        if i % 10 == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(
        delivered < attempts / 2,
        "{delivered} of {attempts} deliveries queued for a client that stopped reading"
    );
    assert_eq!(hub.publish(MESSAGE_ADDED, message), 0);
    assert_eq!(hub.subscriber_count(MESSAGE_ADDED), 1);
}

#[tokio::test]
async fn test_stalled_handshake_is_dropped() {
    let server = start_server_with(1, NotificationHub::new(), Duration::from_millis(100)).await;
    let addr = server.url.trim_start_matches("ws://").to_string();

    // one peer holds the only slot, the other is over the limit; neither
    // ever sends a handshake
    let mut holder = TcpStream::connect(addr.as_str()).await.expect("connect");
    let mut extra = TcpStream::connect(addr.as_str()).await.expect("connect");

    for stream in [&mut holder, &mut extra] {
        let mut buf = [0u8; 64];
        let read = timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .expect("server kept a stalled handshake open");
        assert!(matches!(read, Ok(0) | Err(_)));
    }

    for _ in 0..100 {
        if server.ctx.active_connections() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.ctx.active_connections(), 0);
    let _ws = authed_client(&server, "admin", "password").await;
}

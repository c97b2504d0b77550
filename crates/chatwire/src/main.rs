//! CLI for chatwire
//!
//! Subcommands:
//! - `server`: run the chat server
//! - `client`: log in, subscribe, post one message and print what arrives
//!   (useful for smoke tests)

use std::sync::Arc;

use chatwire_config::{Settings, load_config};
use chatwire_hub::NotificationHub;
use chatwire_service::ChatService;
use chatwire_store::open_store;
use chatwire_transport::{ServerContext, start_websocket_server};
use clap::Parser;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "chatwire")]
enum Command {
    /// Start the WebSocket chat server
    Server,
    /// Run the example client (login, auth, subscribe, post)
    Client {
        /// WebSocket server URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:9000")]
        url: String,
        #[arg(long, default_value = "admin")]
        username: String,
        #[arg(long, default_value = "password")]
        password: String,
        /// Message to post once subscribed
        #[arg(long, default_value = "Hello from chatwire")]
        text: String,
    },
}

#[tokio::main]
async fn main() {
    let cmd = Command::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            chatwire_utils::logging::init("info");
            error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    chatwire_utils::logging::init(&settings.log.level);

    match cmd {
        Command::Server => {
            if let Err(e) = run_server(settings).await {
                error!("Server failed: {e}");
            }
        }
        Command::Client {
            url,
            username,
            password,
            text,
        } => {
            if let Err(e) = run_client(&url, &username, &password, &text).await {
                error!("Client failed: {e}");
            }
        }
    }
}

async fn run_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(&settings.store)?;
    let hub = NotificationHub::from_settings(&settings.hub);
    let service = ChatService::new(store, hub.clone());
    let ctx = Arc::new(ServerContext::from_settings(service, &settings));
    let addr = format!("{}:{}", settings.server.host, settings.server.port);

    info!(
        "starting chatwire on {addr} ({:?} store, {} subscribers max)",
        settings.store.backend, settings.hub.max_subscribers
    );

    tokio::select! {
        res = start_websocket_server(&addr, ctx) => {
            if let Err(e) = res {
                error!("WebSocket server exited: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    hub.shutdown();
    Ok(())
}

async fn run_client(
    url: &str,
    username: &str,
    password: &str,
    text: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    use futures_util::{SinkExt, StreamExt};
    use serde_json::{Value, json};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    let url = url::Url::parse(url)?;
    let (mut ws_stream, _response) = connect_async(url.as_str()).await?;

    // 1. Login
    let login = json!({ "type": "login", "username": username, "password": password });
    ws_stream.send(WsMessage::text(login.to_string())).await?;

    let token = match ws_stream.next().await {
        Some(Ok(WsMessage::Text(msg))) => {
            println!("Login response: {}", msg.as_str());
            let v: Value = serde_json::from_str(msg.as_str())?;
            match v.get("token").and_then(Value::as_str) {
                Some(token) => token.to_string(),
                None => return Err("login rejected".into()),
            }
        }
        _ => return Err("connection closed during login".into()),
    };

    // 2. Auth, 3. Subscribe, 4. Post
    for frame in [
        json!({ "type": "auth", "token": token }),
        json!({ "type": "subscribe" }),
        json!({ "type": "add_message", "text": text }),
    ] {
        ws_stream.send(WsMessage::text(frame.to_string())).await?;
    }

    // Print replies until our own message comes back through the subscription
    while let Some(Ok(WsMessage::Text(msg))) = ws_stream.next().await {
        println!("Incoming: {}", msg.as_str());
        let v: Value = serde_json::from_str(msg.as_str())?;
        match v.get("type").and_then(Value::as_str) {
            Some("message_added") => break,
            Some("error") => return Err(format!("server error: {}", msg.as_str()).into()),
            _ => {}
        }
    }

    ws_stream.close(None).await?;
    Ok(())
}

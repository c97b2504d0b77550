use std::collections::HashMap;

use serde::Deserialize;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub hub: HubSettings,
    pub store: StoreSettings,
    pub log: LogSettings,
}

/// Where the WebSocket server binds and how many connections it accepts.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
}

/// Token signing and the login directory.
#[derive(Debug, Deserialize, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    /// username -> password
    pub users: HashMap<String, String>,
}

/// Notification hub limits.
#[derive(Debug, Deserialize, Clone)]
pub struct HubSettings {
    pub max_subscribers: usize,
    /// Per-subscriber buffer; deliveries to a full buffer are dropped.
    pub subscriber_buffer: usize,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sled,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// Database directory, only used by the sled backend.
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub auth: Option<PartialAuthSettings>,
    pub hub: Option<PartialHubSettings>,
    pub store: Option<PartialStoreSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub max_connections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialAuthSettings {
    pub jwt_secret: Option<String>,
    pub token_ttl_secs: Option<u64>,
    pub users: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialHubSettings {
    pub max_subscribers: Option<usize>,
    pub subscriber_buffer: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialStoreSettings {
    pub backend: Option<StoreBackend>,
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 9000,
                max_connections: 1000,
            },
            auth: AuthSettings {
                jwt_secret: "change-me".to_string(),
                token_ttl_secs: 24 * 60 * 60,
                users: HashMap::from([("admin".to_string(), "password".to_string())]),
            },
            hub: HubSettings {
                max_subscribers: 10_000,
                subscriber_buffer: 64,
            },
            store: StoreSettings {
                backend: StoreBackend::Memory,
                path: "chatwire_db".to_string(),
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Overlay the values that were provided on top of `base`.
    pub fn merge_into(self, base: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let auth = self.auth.unwrap_or_default();
        let hub = self.hub.unwrap_or_default();
        let store = self.store.unwrap_or_default();
        let log = self.log.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(base.server.host),
                port: server.port.unwrap_or(base.server.port),
                max_connections: server
                    .max_connections
                    .unwrap_or(base.server.max_connections),
            },
            auth: AuthSettings {
                jwt_secret: auth.jwt_secret.unwrap_or(base.auth.jwt_secret),
                token_ttl_secs: auth.token_ttl_secs.unwrap_or(base.auth.token_ttl_secs),
                users: auth.users.unwrap_or(base.auth.users),
            },
            hub: HubSettings {
                max_subscribers: hub.max_subscribers.unwrap_or(base.hub.max_subscribers),
                subscriber_buffer: hub
                    .subscriber_buffer
                    .unwrap_or(base.hub.subscriber_buffer),
            },
            store: StoreSettings {
                backend: store.backend.unwrap_or(base.store.backend),
                path: store.path.unwrap_or(base.store.path),
            },
            log: LogSettings {
                level: log.level.unwrap_or(base.log.level),
            },
        }
    }
}

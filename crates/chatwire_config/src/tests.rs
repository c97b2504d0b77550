use std::fs;

use serial_test::serial;
use tempfile::TempDir;

use super::settings::{PartialHubSettings, PartialSettings, Settings, StoreBackend};
use super::load_config_from;

fn write_config(dir: &TempDir, body: &str) -> String {
    let path = dir.path().join("default.toml");
    fs::write(&path, body).expect("write config file");
    dir.path()
        .join("default")
        .to_str()
        .expect("utf-8 path")
        .to_string()
}

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 9000);
    assert_eq!(settings.server.max_connections, 1000);
    assert_eq!(settings.auth.token_ttl_secs, 86_400);
    assert_eq!(settings.auth.users.get("admin").map(String::as_str), Some("password"));
    assert_eq!(settings.hub.max_subscribers, 10_000);
    assert_eq!(settings.hub.subscriber_buffer, 64);
    assert_eq!(settings.store.backend, StoreBackend::Memory);
    assert_eq!(settings.log.level, "info");
}

#[test]
fn partial_settings_only_override_given_fields() {
    let partial = PartialSettings {
        hub: Some(PartialHubSettings {
            max_subscribers: Some(5),
            subscriber_buffer: None,
        }),
        ..Default::default()
    };

    let merged = partial.merge_into(Settings::default());
    assert_eq!(merged.hub.max_subscribers, 5);
    assert_eq!(merged.hub.subscriber_buffer, 64);
    assert_eq!(merged.server.port, 9000);
}

#[test]
#[serial]
fn missing_file_yields_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("absent");
    let cfg = load_config_from(path.to_str().expect("utf-8 path")).expect("load_config failed");
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.store.backend, StoreBackend::Memory);
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = write_config(
        &tmp,
        r#"
            [server]
            host = "0.0.0.0"
            port = 9100

            [auth]
            jwt_secret = "file_secret"
            users = { alice = "alice-pw", bob = "bob-pw" }

            [hub]
            subscriber_buffer = 8

            [store]
            backend = "sled"
            path = "/tmp/chat"
        "#,
    );

    let cfg = load_config_from(&path).expect("load_config failed");
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 9100);
    assert_eq!(cfg.server.max_connections, 1000);
    assert_eq!(cfg.auth.jwt_secret, "file_secret");
    assert_eq!(cfg.auth.users.len(), 2);
    assert_eq!(cfg.auth.users.get("bob").map(String::as_str), Some("bob-pw"));
    assert_eq!(cfg.hub.subscriber_buffer, 8);
    assert_eq!(cfg.hub.max_subscribers, 10_000);
    assert_eq!(cfg.store.backend, StoreBackend::Sled);
    assert_eq!(cfg.store.path, "/tmp/chat");
}

#[test]
#[serial]
fn environment_overrides_file() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = write_config(
        &tmp,
        r#"
            [server]
            port = 9100
        "#,
    );

    temp_env::with_vars(
        [
            ("CHATWIRE_SERVER__PORT", Some("9200")),
            ("CHATWIRE_AUTH__JWT_SECRET", Some("env_secret")),
            ("CHATWIRE_LOG__LEVEL", Some("debug")),
        ],
        || {
            let cfg = load_config_from(&path).expect("load_config failed");
            assert_eq!(cfg.server.port, 9200);
            assert_eq!(cfg.auth.jwt_secret, "env_secret");
            assert_eq!(cfg.log.level, "debug");
        },
    );
}

//! chatwire_config
//!
//! Settings are layered: built-in defaults, then an optional
//! `config/default.toml`, then `CHATWIRE_`-prefixed environment variables
//! (a `.env` file is loaded first if present). Nested keys use `__`, for
//! example `CHATWIRE_SERVER__PORT=9100` or `CHATWIRE_AUTH__JWT_SECRET=...`.

pub mod settings;

#[cfg(test)]
mod tests;

use config::{Config, ConfigError, Environment, File};

use crate::settings::PartialSettings;

pub use settings::{
    AuthSettings, HubSettings, LogSettings, ServerSettings, Settings, StoreBackend, StoreSettings,
};

pub const ENV_PREFIX: &str = "CHATWIRE";

pub fn load_config() -> Result<Settings, ConfigError> {
    let _ = dotenvy::dotenv();
    load_config_from("config/default")
}

/// Load settings from `path` (extension optional, the file may be absent)
/// and the environment.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge_into(Settings::default()))
}

use common::StorageConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::avatar::DEFAULT_MAX_RESIZE_DIMENSION;

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    /// Allowed origins. Empty means any origin.
    pub allow_origins: Vec<String>,
    pub max_age: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AvatarConfig {
    /// Prefix of the `url_origin` / `url_thumb` links in avatar responses.
    pub url_prefix: String,
    /// Largest width, height or square size a resized read may ask for.
    pub max_resize_dimension: u32,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            url_prefix: "api/v1/file/".into(),
            max_resize_dimension: DEFAULT_MAX_RESIZE_DIMENSION,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub avatar: AvatarConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            // Load from config/config.toml
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g., AVATAR__SERVER__PORT)
            .add_source(
                Environment::with_prefix("AVATAR")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.cors.allow_origins")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Built-in defaults only, without reading files or the environment.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 4567)?
            .set_default("server.cors.allow_origins", Vec::<String>::new())?
            .set_default("server.cors.max_age", 3600)?
            .set_default("database.url", "sqlite://avatars.db?mode=rwc")?
            .set_default("database.max_connections", 10)
    }
}

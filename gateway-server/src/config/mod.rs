use crate::config::database::DatabaseConfig;
use crate::config::oauth::OAuthConfig;
use config::{Config as ConfigCrate, ConfigError};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub mod database;
pub mod oauth;

/// Environment variable naming an optional configuration file (YAML or TOML)
pub const CONFIG_FILE_ENV: &str = "GATEWAY_CONFIG_FILE";

/// Errors that make the gateway refuse to start
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("invalid duration '{value}' for {field}: {source}")]
    InvalidDuration {
        field: &'static str,
        value: String,
        source: humantime::DurationError,
    },

    #[error("oauth.database names unknown database instance '{0}'")]
    UnknownDatabase(String),
}

/// Parses a human-readable duration such as `24h` or `10m`
pub(crate) fn parse_duration(field: &'static str, value: &str) -> Result<Duration, SettingsError> {
    humantime::parse_duration(value).map_err(|source| SettingsError::InvalidDuration {
        field,
        value: value.to_string(),
        source,
    })
}

/// Main configuration structure for the gateway
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// The port the gateway listens on (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path of the route definitions file (default: routes.yaml)
    #[serde(default = "default_routes_file")]
    pub routes_file: String,

    /// Timeout for proxied upstream requests in seconds (default: 30)
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout: u64,

    /// Largest request body buffered for the proxy hop, in bytes (default: 2 MiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Administrative API settings
    #[serde(default)]
    pub admin: AdminConfig,

    /// Named database instances
    #[serde(default = "default_databases")]
    pub databases: HashMap<String, DatabaseConfig>,

    /// OAuth plugin settings
    #[serde(default)]
    pub oauth: OAuthConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AdminConfig {
    /// When set, the application management endpoints require `Authorization: Bearer <api_key>`
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_port() -> u16 {
    8080
}

fn default_routes_file() -> String {
    "routes.yaml".to_string()
}

fn default_upstream_timeout() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_databases() -> HashMap<String, DatabaseConfig> {
    HashMap::from([(oauth::DEFAULT_DATABASE.to_string(), DatabaseConfig::default())])
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            routes_file: default_routes_file(),
            upstream_timeout: default_upstream_timeout(),
            max_body_bytes: default_max_body_bytes(),
            admin: AdminConfig::default(),
            databases: default_databases(),
            oauth: OAuthConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Loads the configuration from the optional file named by `GATEWAY_CONFIG_FILE`,
    /// overridden by `GATEWAY_*` environment variables (`__` separates nested keys)
    pub fn new() -> Result<Self, SettingsError> {
        let mut builder = ConfigCrate::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(config::File::with_name(&path).required(true));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("GATEWAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// The database instance the OAuth plugin is configured to use
    pub fn oauth_database(&self) -> Result<&DatabaseConfig, SettingsError> {
        self.databases
            .get(&self.oauth.database)
            .ok_or_else(|| SettingsError::UnknownDatabase(self.oauth.database.clone()))
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            port: 0, // Let the OS choose a port
            routes_file: "routes.yaml".to_string(),
            upstream_timeout: 5,
            max_body_bytes: 16 * 1024,
            admin: AdminConfig {
                api_key: Some("test_admin_key".to_string()),
            },
            databases: HashMap::from([(
                oauth::DEFAULT_DATABASE.to_string(),
                DatabaseConfig {
                    url: "sqlite::memory:".to_string(),
                    max_connections: 1,
                    query_timeout: "10s".to_string(),
                },
            )]),
            oauth: OAuthConfig {
                refresh_token: oauth::RefreshTokenConfig {
                    active: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }
}

use crate::config::{parse_duration, SettingsError};
use serde::Deserialize;
use std::time::Duration;

/// Configuration of one named database instance
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// SQLite connection URL (default: sqlite://gateway.db)
    #[serde(default = "default_url")]
    pub url: String,

    /// Maximum number of pooled connections (default: 10)
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Upper bound for every database round trip (default: 10s)
    #[serde(default = "default_query_timeout")]
    pub query_timeout: String,
}

fn default_url() -> String {
    "sqlite://gateway.db".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_query_timeout() -> String {
    "10s".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_connections: default_max_connections(),
            query_timeout: default_query_timeout(),
        }
    }
}

impl DatabaseConfig {
    pub fn query_timeout(&self) -> Result<Duration, SettingsError> {
        parse_duration("database.query_timeout", &self.query_timeout)
    }
}

//! OAuth plugin configuration

use crate::config::{parse_duration, SettingsError};
use serde::Deserialize;
use std::time::Duration;

/// Name of the database instance used when none is configured
pub const DEFAULT_DATABASE: &str = "default";

/// OAuth plugin configuration. Durations are human-readable strings such as `24h`.
#[derive(Debug, Deserialize, Clone)]
pub struct OAuthConfig {
    /// Named database instance holding the OAuth tables (default: default)
    #[serde(default = "default_database")]
    pub database: String,

    /// Lifetime of issued access tokens (default: 24h)
    #[serde(default = "default_access_token_timeout")]
    pub access_token_timeout: String,

    /// Lifetime of authorization codes (default: 10m)
    #[serde(default = "default_authorization_code_timeout")]
    pub authorization_code_timeout: String,

    #[serde(default)]
    pub refresh_token: RefreshTokenConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RefreshTokenConfig {
    /// Lifetime of refresh tokens (default: 720h)
    #[serde(default = "default_refresh_token_timeout")]
    pub timeout: String,

    /// Whether refresh tokens are issued and redeemable (default: false)
    #[serde(default)]
    pub active: bool,
}

/// OAuth settings with every duration parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OAuthSettings {
    pub access_token_timeout: Duration,
    pub authorization_code_timeout: Duration,
    pub refresh_token_timeout: Duration,
    pub refresh_token_active: bool,
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

fn default_access_token_timeout() -> String {
    "24h".to_string()
}

fn default_authorization_code_timeout() -> String {
    "10m".to_string()
}

fn default_refresh_token_timeout() -> String {
    "720h".to_string()
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            access_token_timeout: default_access_token_timeout(),
            authorization_code_timeout: default_authorization_code_timeout(),
            refresh_token: RefreshTokenConfig::default(),
        }
    }
}

impl Default for RefreshTokenConfig {
    fn default() -> Self {
        Self {
            timeout: default_refresh_token_timeout(),
            active: false,
        }
    }
}

impl OAuthConfig {
    /// Parses every duration; a malformed one is a startup error
    pub fn settings(&self) -> Result<OAuthSettings, SettingsError> {
        Ok(OAuthSettings {
            access_token_timeout: parse_duration(
                "oauth.access_token_timeout",
                &self.access_token_timeout,
            )?,
            authorization_code_timeout: parse_duration(
                "oauth.authorization_code_timeout",
                &self.authorization_code_timeout,
            )?,
            refresh_token_timeout: parse_duration(
                "oauth.refresh_token.timeout",
                &self.refresh_token.timeout,
            )?,
            refresh_token_active: self.refresh_token.active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_oauth_config() {
        let settings = OAuthConfig::default().settings().unwrap();
        assert_eq!(settings.access_token_timeout, Duration::from_secs(24 * 3600));
        assert_eq!(settings.authorization_code_timeout, Duration::from_secs(600));
        assert_eq!(settings.refresh_token_timeout, Duration::from_secs(720 * 3600));
        assert!(!settings.refresh_token_active);
    }

    #[test]
    fn test_malformed_duration() {
        let config = OAuthConfig {
            authorization_code_timeout: "ten minutes".to_string(),
            ..Default::default()
        };
        let err = config.settings().unwrap_err();
        assert!(matches!(
            err,
            SettingsError::InvalidDuration {
                field: "oauth.authorization_code_timeout",
                ..
            }
        ));
    }

    #[test]
    fn test_nested_refresh_config() {
        let config: OAuthConfig = serde_yaml::from_str(
            r#"
access_token_timeout: 1h
refresh_token:
  active: true
  timeout: 48h
"#,
        )
        .unwrap();
        let settings = config.settings().unwrap();
        assert_eq!(config.database, DEFAULT_DATABASE);
        assert_eq!(settings.access_token_timeout, Duration::from_secs(3600));
        assert_eq!(settings.refresh_token_timeout, Duration::from_secs(48 * 3600));
        assert!(settings.refresh_token_active);
    }
}

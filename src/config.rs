//! Configuration file for the connection manager
//!
//! A single TOML file with a required `[connection]` section and optional
//! `[reconnect]` and `[health]` sections.

use crate::manager::{
    HealthMonitor, ReconnectConfig, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManagerConfig {
    pub connection: ConnectionSection,
    #[serde(default)]
    pub reconnect: ReconnectSection,
    /// Health server settings; the server is disabled when absent
    pub health: Option<HealthSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionSection {
    /// Endpoint URL (`ws://` or `wss://`)
    pub url: String,
    /// Timeout for a single connection attempt in milliseconds (default: 30000)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

/// Reconnection policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }
}

impl ReconnectSection {
    pub fn to_reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: self.max_attempts,
            base_delay_ms: self.base_delay_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthSection {
    pub port: u16,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid connection URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ManagerConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ManagerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration for a bare URL with default policy and no health server
    pub fn for_url(url: &str) -> Result<Self, ConfigError> {
        let config = Self {
            connection: ConnectionSection {
                url: url.to_string(),
                connect_timeout_ms: default_connect_timeout_ms(),
            },
            reconnect: ReconnectSection::default(),
            health: None,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url(&self.connection.url)?;

        if self.connection.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "connection.connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        HealthMonitor::validate_reconnect_config(&self.reconnect.to_reconnect_config())
            .map_err(|e| ConfigError::InvalidConfig(format!("reconnect.{e}")))
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.connection.connect_timeout_ms)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[connection]
url = "ws://localhost:9001/realtime"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Accept only absolute `ws://` and `wss://` URLs with a host
fn validate_url(raw: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };

    let parsed = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;

    match parsed.scheme() {
        "ws" | "wss" => {}
        other => return Err(invalid(format!("scheme must be ws or wss, got {other}"))),
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }

    Ok(())
}

//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, validation, and error handling.

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use wsrelay::config::{ConfigError, ManagerConfig};
use wsrelay::manager::ConnectionManager;
use wsrelay::testing::MockConnector;

fn write_config(contents: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{contents}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[connection]
url = "wss://realtime.example.org/socket"

[reconnect]
max_attempts = 7
base_delay_ms = 500

[health]
port = 9090
"#,
    );

    let config = ManagerConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.connection.url, "wss://realtime.example.org/socket");
    assert_eq!(config.reconnect.max_attempts, 7);
    assert_eq!(config.reconnect.base_delay_ms, 500);
    assert_eq!(config.health.map(|h| h.port), Some(9090));
}

#[test]
fn test_defaults_match_documented_policy() {
    let temp_file = write_config(
        r#"
[connection]
url = "ws://localhost:9001"
"#,
    );

    let config = ManagerConfig::load_from_file(temp_file.path()).unwrap();
    let policy = config.reconnect.to_reconnect_config();

    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.base_delay_ms, 1000);
    assert!(config.health.is_none());
}

#[test]
fn test_manager_uses_configured_policy() {
    let temp_file = write_config(
        r#"
[connection]
url = "ws://localhost:9001"

[reconnect]
max_attempts = 2
base_delay_ms = 250
"#,
    );
    let config = ManagerConfig::load_from_file(temp_file.path()).unwrap();

    let manager = ConnectionManager::from_config(MockConnector::new(), &config);

    assert_eq!(manager.reconnect_config().max_attempts, 2);
    assert_eq!(manager.reconnect_config().base_delay_ms, 250);
}

#[test]
fn test_missing_file_is_read_error() {
    let result = ManagerConfig::load_from_file(Path::new("/nonexistent/wsrelay.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let temp_file = write_config("[connection\nurl = ");
    let result = ManagerConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_non_websocket_url_rejected() {
    for url in ["http://example.org", "mqtt://localhost:1883", "localhost:9001"] {
        let temp_file = write_config(&format!("[connection]\nurl = \"{url}\"\n"));
        let result = ManagerConfig::load_from_file(temp_file.path());
        assert!(
            matches!(result, Err(ConfigError::InvalidUrl { .. })),
            "expected {url} to be rejected"
        );
    }
}

#[test]
fn test_invalid_values_rejected() {
    let temp_file = write_config(
        r#"
[connection]
url = "ws://localhost:9001"
connect_timeout_ms = 0
"#,
    );
    let error = ManagerConfig::load_from_file(temp_file.path()).unwrap_err();
    assert!(error.to_string().contains("connect_timeout_ms"));
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = ManagerConfig::for_url("ws://localhost:9001").unwrap();
    let rendered = toml::to_string_pretty(&config).unwrap();
    let reparsed = ManagerConfig::from_toml_str(&rendered).unwrap();
    assert_eq!(config, reparsed);
}

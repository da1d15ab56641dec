//! Tests for logging configuration and format parsing

use tracing::Level;
use wsrelay::observability::logging::{init_logging, parse_level, LogFormat};

#[test]
fn test_log_format_parse() {
    assert_eq!(LogFormat::parse("json"), LogFormat::Json);
    assert_eq!(LogFormat::parse("Pretty"), LogFormat::Pretty);
    assert_eq!(LogFormat::parse("COMPACT"), LogFormat::Compact);
}

#[test]
fn test_log_format_parse_whitespace_falls_back_to_json() {
    assert_eq!(LogFormat::parse("  pretty  "), LogFormat::Json);
    assert_eq!(LogFormat::parse("compact\n"), LogFormat::Json);
}

#[test]
fn test_parse_level_defaults_to_info() {
    assert_eq!(parse_level("warn"), Level::WARN);
    assert_eq!(parse_level("nonsense"), Level::INFO);
    assert_eq!(parse_level(""), Level::INFO);
}

#[test]
fn test_init_logging_twice_does_not_panic() {
    init_logging(Level::DEBUG, LogFormat::Compact, false);
    init_logging(Level::INFO, LogFormat::Json, true);
    tracing::info!("logging initialized");
}

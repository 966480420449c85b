//! Integration tests for configuration loading

use railpoint::infra::Config;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[station]
host = "10.0.0.42"
port = 21106
keepalive_interval_secs = 15
startup_command_gap_ms = 25

[transport]
send_retry_attempts = 5
send_backoff_ms = 100

[monitor]
stats_interval_secs = 30
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.station_host(), "10.0.0.42");
    assert_eq!(config.station_port(), 21106);
    assert_eq!(config.keepalive_interval_secs(), 15);
    assert_eq!(config.startup_command_gap_ms(), 25);
    assert_eq!(config.send_retry_attempts(), 5);
    assert_eq!(config.send_backoff_ms(), 100);
    assert_eq!(config.stats_interval_secs(), 30);
}

#[test]
fn test_optional_sections_fall_back_to_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[station]
host = "192.168.0.111"
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.station_host(), "192.168.0.111");
    assert_eq!(config.station_port(), 21105);
    assert_eq!(config.send_retry_attempts(), 3);
    assert_eq!(config.send_backoff_ms(), 50);
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.station_port(), 21105);
    assert_eq!(config.send_retry_attempts(), 3);
}

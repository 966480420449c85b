//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    pub host: String,
    #[serde(default = "default_station_port")]
    pub port: u16,
    /// Seconds between keepalive status requests (0 disables).
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
    /// Pause between startup commands so the station is not flooded.
    #[serde(default = "default_startup_command_gap_ms")]
    pub startup_command_gap_ms: u64,
}

fn default_station_port() -> u16 {
    crate::protocol::DEFAULT_PORT
}

fn default_keepalive_interval_secs() -> u64 {
    30
}

fn default_startup_command_gap_ms() -> u64 {
    50
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            host: "192.168.0.111".to_string(),
            port: default_station_port(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            startup_command_gap_ms: default_startup_command_gap_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_send_retry_attempts")]
    pub send_retry_attempts: u32,
    /// Initial backoff before the first retry; doubles per attempt.
    #[serde(default = "default_send_backoff_ms")]
    pub send_backoff_ms: u64,
}

fn default_send_retry_attempts() -> u32 {
    3
}

fn default_send_backoff_ms() -> u64 {
    50
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            send_retry_attempts: default_send_retry_attempts(),
            send_backoff_ms: default_send_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between feedback statistics summaries (0 disables).
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_stats_interval_secs() -> u64 {
    10
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { stats_interval_secs: default_stats_interval_secs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    pub station: StationConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    station_host: String,
    station_port: u16,
    keepalive_interval_secs: u64,
    startup_command_gap_ms: u64,
    send_retry_attempts: u32,
    send_backoff_ms: u64,
    stats_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        let station = StationConfig::default();
        let transport = TransportConfig::default();
        let monitor = MonitorConfig::default();
        Self {
            station_host: station.host,
            station_port: station.port,
            keepalive_interval_secs: station.keepalive_interval_secs,
            startup_command_gap_ms: station.startup_command_gap_ms,
            send_retry_attempts: transport.send_retry_attempts,
            send_backoff_ms: transport.send_backoff_ms,
            stats_interval_secs: monitor.stats_interval_secs,
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            station_host: toml_config.station.host,
            station_port: toml_config.station.port,
            keepalive_interval_secs: toml_config.station.keepalive_interval_secs,
            startup_command_gap_ms: toml_config.station.startup_command_gap_ms,
            send_retry_attempts: toml_config.transport.send_retry_attempts,
            send_backoff_ms: toml_config.transport.send_backoff_ms,
            stats_interval_secs: toml_config.monitor.stats_interval_secs,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries the TOML file, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => {
                tracing::info!(config_file = %path, "config_loaded_from_file");
                config
            }
            Err(e) => {
                tracing::warn!(config_file = %path, error = %e, "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn station_host(&self) -> &str {
        &self.station_host
    }

    pub fn station_port(&self) -> u16 {
        self.station_port
    }

    pub fn keepalive_interval_secs(&self) -> u64 {
        self.keepalive_interval_secs
    }

    pub fn startup_command_gap_ms(&self) -> u64 {
        self.startup_command_gap_ms
    }

    pub fn send_retry_attempts(&self) -> u32 {
        self.send_retry_attempts
    }

    pub fn send_backoff_ms(&self) -> u64 {
        self.send_backoff_ms
    }

    pub fn stats_interval_secs(&self) -> u64 {
        self.stats_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}

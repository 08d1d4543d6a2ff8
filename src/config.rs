//! Configuration module for the table-bridge server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Whether the listener exits after one connection or keeps accepting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ServeMode {
    /// Accept and serve a single connection, then exit
    Once,
    /// Keep accepting connections until the process is stopped
    Forever,
}

/// Command-line arguments for the bridge server
#[derive(Parser, Debug)]
#[command(name = "table-bridge")]
#[command(author = "table-bridge authors")]
#[command(version = "0.1.0")]
#[command(about = "A framed-JSON table processing bridge", long_about = None)]
pub struct CliArgs {
    /// Name of the processor to run request tables through
    #[arg(default_value = "identity")]
    pub processor: String,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:8080)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Serve a single connection or keep accepting
    #[arg(long, value_enum)]
    pub mode: Option<ServeMode>,

    /// Frame read/write timeout in seconds (0 = no timeout)
    #[arg(short = 't', long)]
    pub timeout_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Serve mode
    #[serde(default = "default_mode")]
    pub mode: ServeMode,
    /// Frame read/write timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            mode: default_mode(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Bridge-related configuration
#[derive(Debug, Deserialize)]
pub struct BridgeConfig {
    /// Processor identifier to resolve at startup
    #[serde(default = "default_processor")]
    pub processor: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            processor: default_processor(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_mode() -> ServeMode {
    ServeMode::Once
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_processor() -> String {
    "identity".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub processor: String,
    pub mode: ServeMode,
    pub timeout_secs: u64,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();
        Self::merge(cli)
    }

    fn merge(cli: CliArgs) -> Result<Self, ConfigError> {
        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        // Merge CLI args with TOML config (CLI takes precedence)
        Ok(Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            processor: if cli.processor != "identity" {
                cli.processor
            } else {
                toml_config.bridge.processor
            },
            mode: cli.mode.unwrap_or(toml_config.server.mode),
            timeout_secs: cli.timeout_secs.unwrap_or(toml_config.server.timeout_secs),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }

    /// Frame I/O timeout, if one is configured.
    pub fn frame_timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.server.mode, ServeMode::Once);
        assert_eq!(config.server.timeout_secs, 30);
        assert_eq!(config.bridge.processor, "identity");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "127.0.0.1:9090"
            mode = "forever"
            timeout_secs = 5

            [bridge]
            processor = "reverse"

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9090");
        assert_eq!(config.server.mode, ServeMode::Forever);
        assert_eq!(config.server.timeout_secs, 5);
        assert_eq!(config.bridge.processor, "reverse");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_takes_precedence() {
        let cli = CliArgs {
            processor: "reverse".to_string(),
            config: None,
            listen: Some("127.0.0.1:7000".to_string()),
            mode: Some(ServeMode::Forever),
            timeout_secs: Some(0),
            log_level: "info".to_string(),
        };

        let config = Config::merge(cli).unwrap();
        assert_eq!(config.listen, "127.0.0.1:7000");
        assert_eq!(config.processor, "reverse");
        assert_eq!(config.mode, ServeMode::Forever);
        assert_eq!(config.frame_timeout(), None);
    }

    #[test]
    fn test_frame_timeout() {
        let cli = CliArgs {
            processor: "identity".to_string(),
            config: None,
            listen: None,
            mode: None,
            timeout_secs: Some(12),
            log_level: "info".to_string(),
        };

        let config = Config::merge(cli).unwrap();
        assert_eq!(config.frame_timeout(), Some(Duration::from_secs(12)));
    }
}

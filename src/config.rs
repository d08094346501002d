//! Configuration module for the fileshelf server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the file server
#[derive(Parser, Debug)]
#[command(name = "fileshelf")]
#[command(author = "fileshelf authors")]
#[command(version = "0.1.0")]
#[command(about = "A TCP file service with framed JSON commands", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0)
    #[arg(short = 'l', long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Number of pool workers
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Worker execution strategy
    #[arg(short = 's', long, value_enum)]
    pub strategy: Option<WorkerStrategy>,

    /// Directory the file store serves
    #[arg(short = 'r', long)]
    pub root: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Run as a pool worker child serving task lines on stdin (internal)
    #[arg(long, hide = true)]
    pub io_worker: bool,
}

/// How the worker pool executes submitted frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStrategy {
    /// OS threads sharing the server's memory
    Thread,
    /// Isolated child processes fed serialized frames
    Process,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of pool workers
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Worker execution strategy
    #[serde(default = "default_strategy")]
    pub strategy: WorkerStrategy,
    /// Interval for logging request totals in seconds
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
            strategy: default_strategy(),
            stats_interval: default_stats_interval(),
        }
    }
}

/// Storage-related configuration
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// Directory the file store serves
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
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

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    crate::DEFAULT_PORT
}

fn default_workers() -> usize {
    5
}

fn default_strategy() -> WorkerStrategy {
    WorkerStrategy::Thread
}

fn default_stats_interval() -> u64 {
    60 // 60 seconds
}

fn default_root() -> PathBuf {
    PathBuf::from("files")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub strategy: WorkerStrategy,
    pub root: PathBuf,
    pub stats_interval: u64,
    pub log_level: String,
    /// True when this process should run as a pool worker child.
    pub worker_mode: bool,
    /// Override for the worker executable; `None` means the running binary.
    pub worker_program: Option<PathBuf>,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::merge(CliArgs::parse())
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
        let config = Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            workers: cli.workers.unwrap_or(toml_config.server.workers),
            strategy: cli.strategy.unwrap_or(toml_config.server.strategy),
            root: cli.root.unwrap_or(toml_config.storage.root),
            stats_interval: toml_config.server.stats_interval,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
            worker_mode: cli.io_worker,
            worker_program: None,
        };

        if config.workers == 0 {
            return Err(ConfigError::InvalidWorkers);
        }
        Ok(config)
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    InvalidWorkers,
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
            ConfigError::InvalidWorkers => {
                write!(f, "Worker count must be at least 1")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_args() -> CliArgs {
        CliArgs {
            config: None,
            host: None,
            port: None,
            workers: None,
            strategy: None,
            root: None,
            log_level: "info".to_string(),
            io_worker: false,
        }
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 45000);
        assert_eq!(config.server.workers, 5);
        assert_eq!(config.server.strategy, WorkerStrategy::Thread);
        assert_eq!(config.storage.root, PathBuf::from("files"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            port = 9000
            workers = 8
            strategy = "process"
            stats_interval = 10

            [storage]
            root = "/srv/files"

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.workers, 8);
        assert_eq!(config.server.strategy, WorkerStrategy::Process);
        assert_eq!(config.server.stats_interval, 10);
        assert_eq!(config.storage.root, PathBuf::from("/srv/files"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_toml_defaults() {
        let mut cli = no_args();
        cli.port = Some(8080);
        cli.strategy = Some(WorkerStrategy::Process);

        let config = Config::merge(cli).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.strategy, WorkerStrategy::Process);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.workers, 5);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut cli = no_args();
        cli.workers = Some(0);

        match Config::merge(cli) {
            Err(ConfigError::InvalidWorkers) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }
}

//! Engine settings and transport configuration

use crate::core::transport::{SerialConfig, TcpConfig, TcpServerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Platform config directory unknown
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// File could not be read or written
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema
    #[error("Invalid config {path}: {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },

    /// Config could not be serialized
    #[error("Cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Dispatch loop settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Readiness poll timeout in milliseconds (`0` = never wait, `None` = wait for input)
    pub poll_timeout_ms: Option<u64>,
    /// Template for error reports, `{}` is replaced with the message
    pub error_format: String,
    /// Answer `help` with the permitted commands when no `help` command is registered
    pub builtin_help: bool,
    /// Stop `run_until` once no session and no acceptor is left
    pub stop_when_idle: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: Some(500),
            error_format: "error: {}".to_string(),
            builtin_help: false,
            stop_when_idle: false,
        }
    }
}

impl EngineConfig {
    /// Set poll timeout
    #[must_use]
    pub fn poll_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.poll_timeout_ms = timeout.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Enable the built-in `help`
    #[must_use]
    pub fn builtin_help(mut self, enable: bool) -> Self {
        self.builtin_help = enable;
        self
    }

    /// Stop running once idle
    #[must_use]
    pub fn stop_when_idle(mut self, enable: bool) -> Self {
        self.stop_when_idle = enable;
        self
    }

    /// Get poll timeout as a duration
    pub fn timeout(&self) -> Option<Duration> {
        self.poll_timeout_ms.map(Duration::from_millis)
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Dispatch loop settings
    pub engine: EngineConfig,
    /// Logging settings
    pub logging: LoggingConfig,
    /// Stdin/stdout session
    pub stdio: Option<StdioSessionConfig>,
    /// Listening TCP servers
    pub tcp_servers: Vec<TcpServerConfig>,
    /// Outbound TCP sessions
    pub tcp_clients: Vec<TcpSessionConfig>,
    /// Serial port sessions
    pub serial: Vec<SerialSessionConfig>,
    /// Command file sessions
    pub files: Vec<FileSessionConfig>,
}

impl AppConfig {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        super::config_dir()
            .map(|dir| dir.join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load config from the default location, defaults if absent
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load config from a file, defaults if absent
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save config to a file
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Also write a daily rolling log file
    pub file: bool,
    /// Log directory (defaults to the platform data dir)
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: false,
            directory: None,
        }
    }
}

/// Stdin/stdout session settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StdioSessionConfig {
    /// Permission level
    pub permission: u32,
    /// Echo template, echo disabled when absent
    pub echo: Option<String>,
}

/// Outbound TCP session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpSessionConfig {
    /// Connection settings
    #[serde(flatten)]
    pub tcp: TcpConfig,
    /// Permission level
    #[serde(default)]
    pub permission: u32,
    /// Echo template
    #[serde(default)]
    pub echo: Option<String>,
}

/// Serial session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialSessionConfig {
    /// Port settings
    #[serde(flatten)]
    pub serial: SerialConfig,
    /// Permission level
    #[serde(default)]
    pub permission: u32,
    /// Echo template
    #[serde(default)]
    pub echo: Option<String>,
}

/// Command file session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSessionConfig {
    /// File commands are read from
    pub input: PathBuf,
    /// File results are written to
    pub output: PathBuf,
    /// Append to the output file instead of truncating
    #[serde(default)]
    pub append: bool,
    /// Permission level
    #[serde(default)]
    pub permission: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.timeout(), Some(Duration::from_millis(500)));
        assert_eq!(config.error_format, "error: {}");
        assert!(!config.builtin_help);
    }

    #[test]
    fn test_parse_partial_config() {
        let config: AppConfig = toml::from_str(
            r#"
            [engine]
            poll_timeout_ms = 50
            builtin_help = true

            [stdio]
            permission = 3

            [[tcp_servers]]
            bind = "0.0.0.0:5555"
            permission = 1

            [[serial]]
            port = "/dev/ttyUSB0"
            baud_rate = 115200
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.poll_timeout_ms, Some(50));
        assert_eq!(config.engine.error_format, "error: {}");
        assert!(config.engine.builtin_help);
        assert_eq!(config.stdio.unwrap().permission, 3);
        assert_eq!(config.tcp_servers[0].permission, 1);
        assert_eq!(config.tcp_servers[0].echo.as_deref(), Some("#{}"));
        assert_eq!(config.serial[0].serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial[0].permission, 0);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert!(config.tcp_servers.is_empty());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = AppConfig::default();
        config.stdio = Some(StdioSessionConfig::default());
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.engine, config.engine);
        assert!(loaded.stdio.is_some());
    }
}

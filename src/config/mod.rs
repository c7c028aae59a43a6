//! Configuration module
//!
//! Handles engine settings and the transports the binary opens

mod settings;

pub use settings::{
    AppConfig, ConfigError, EngineConfig, FileSessionConfig, LoggingConfig, SerialSessionConfig,
    StdioSessionConfig, TcpSessionConfig,
};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "termplex", "Termplex").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the application data directory
pub fn data_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "termplex", "Termplex").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Get the log directory
pub fn log_dir() -> Option<PathBuf> {
    data_dir().map(|d| d.join("logs"))
}

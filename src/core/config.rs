//! Configuration for the MTP access library and CLI
//!
//! Supports loading configuration from a TOML file. The file lives in the
//! standard per-user configuration directory:
//! - Windows: `%APPDATA%\mtp-access\config.toml`
//! - Linux/macOS: `~/.config/mtp-access/config.toml`

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::transfer::DEFAULT_CHUNK_SIZE;

/// Application name used for the config directory
const APP_NAME: &str = "mtp-access";

/// Default config file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors raised by configuration handling
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine the configuration directory")]
    ConfigDirNotFound,

    #[error("failed to read config file '{0}': {1}")]
    ReadError(PathBuf, String),

    #[error("failed to write config file '{0}': {1}")]
    WriteError(PathBuf, String),

    #[error("failed to parse config file '{0}': {1}")]
    ParseError(PathBuf, String),
}

/// Get the standard configuration directory for the application
pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME))
}

/// Get the standard configuration file path
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Transfer settings
    pub transfer: TransferConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Transfer tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransferConfig {
    /// Chunk size in bytes for streamed reads and writes
    pub chunk_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
    }

    /// Load configuration from the standard location, falling back to
    /// defaults if no file exists there
    pub fn load_default() -> Result<Self, ConfigError> {
        match get_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Save configuration to a specific file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteError(path.to_path_buf(), e.to_string()))?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::WriteError(path.to_path_buf(), e.to_string()))?;
        fs::write(path, contents)
            .map_err(|e| ConfigError::WriteError(path.to_path_buf(), e.to_string()))
    }

    /// Generate a commented default config file as a string
    pub fn generate_default_config() -> String {
        let defaults = Self::default();
        format!(
            "# mtp-access configuration\n\
             \n\
             [transfer]\n\
             # Chunk size in bytes for streamed reads and writes\n\
             chunk_size = {}\n\
             \n\
             [logging]\n\
             # Log level: error, warn, info, debug, trace\n\
             level = \"{}\"\n",
            defaults.transfer.chunk_size, defaults.logging.level
        )
    }
}

/// Initialize the configuration file if it doesn't exist.
///
/// Creates the config directory and writes the default config template.
/// Returns the path to the config file.
pub fn init_config() -> Result<PathBuf, ConfigError> {
    let config_dir = get_config_dir().ok_or(ConfigError::ConfigDirNotFound)?;

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)
            .map_err(|e| ConfigError::WriteError(config_dir.clone(), e.to_string()))?;
    }

    let config_path = config_dir.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        fs::write(&config_path, Config::generate_default_config())
            .map_err(|e| ConfigError::WriteError(config_path.clone(), e.to_string()))?;
    }

    Ok(config_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.transfer.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn parse_partial_config() {
        let config: Config = toml::from_str("[transfer]\nchunk_size = 65536\n").unwrap();
        assert_eq!(config.transfer.chunk_size, 65536);
        // Unspecified sections fall back to defaults
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn generated_default_parses_back() {
        let text = Config::generate_default_config();
        let config: Config = toml::from_str(&text).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.transfer.chunk_size = 131072;
        config.logging.level = "debug".to_string();
        config.save(&path).unwrap();

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded, config);
    }
}

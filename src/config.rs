//! Configuration management module.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::printer::DEFAULT_PORT;

/// Configuration load result.
#[derive(Debug)]
pub enum ConfigLoadResult {
    /// Config loaded successfully.
    Loaded(AppConfig),
    /// Config file missing (defaults apply).
    Missing,
    /// Config file exists but invalid.
    Invalid(ConfigError),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub printer: PrinterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Printer connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterConfig {
    /// TCP control port (default: 8899).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect/read timeout for plain commands in seconds (default: 10).
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Connect/read timeout for uploads in seconds (default: 30).
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
    /// Delay between upload packets in milliseconds (default: 10).
    #[serde(default = "default_packet_delay_ms")]
    pub packet_delay_ms: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_command_timeout_secs() -> u64 {
    10
}

fn default_upload_timeout_secs() -> u64 {
    30
}

fn default_packet_delay_ms() -> u64 {
    10
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file; stderr when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Get config file path (platform config dir, else next to the executable).
    pub fn default_path() -> PathBuf {
        if let Some(dirs) = ProjectDirs::from("", "", "flashforge-bridge") {
            return dirs.config_dir().join("config.toml");
        }
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Attempt to load config with detailed result.
    pub fn try_load(path: &Path) -> ConfigLoadResult {
        if !path.exists() {
            return ConfigLoadResult::Missing;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<AppConfig>(&content) {
                Ok(config) => match config.validate() {
                    Ok(()) => ConfigLoadResult::Loaded(config),
                    Err(e) => ConfigLoadResult::Invalid(e),
                },
                Err(e) => ConfigLoadResult::Invalid(ConfigError::Parse(e)),
            },
            Err(e) => ConfigLoadResult::Invalid(ConfigError::Read(e)),
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.printer.port == 0 {
            return Err(ConfigError::Validation("Printer port must be greater than 0".to_string()));
        }
        if self.printer.command_timeout_secs < 1 {
            return Err(ConfigError::Validation(
                "Command timeout must be at least 1 second".to_string(),
            ));
        }
        if self.printer.upload_timeout_secs < self.printer.command_timeout_secs {
            return Err(ConfigError::Validation(
                "Upload timeout cannot be shorter than command timeout".to_string(),
            ));
        }
        if self.printer.packet_delay_ms > 1000 {
            return Err(ConfigError::Validation("Packet delay cannot exceed 1000 ms".to_string()));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Validation("Log level cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            command_timeout_secs: default_command_timeout_secs(),
            upload_timeout_secs: default_upload_timeout_secs(),
            packet_delay_ms: default_packet_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

//! Configuration management
//!
//! Every section falls back to its defaults, so a settings file only needs
//! the values it changes.

use crate::error::{SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default device descriptor
pub const DEFAULT_DESCRIPTOR: &str = "/dev/ttyACM0,b115200";

/// Smallest accepted input arena
pub const MIN_INPUT_BUFFER_SIZE: usize = 256;

const CONFIG_DIR_NAME: &str = "gcodestream";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Device connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// `-`, `<path>[,b<baud>][,[+|-]crtscts]` or `<host>[:<port>]`
    pub descriptor: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            descriptor: DEFAULT_DESCRIPTOR.to_string(),
        }
    }
}

/// Streaming behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// Blocks sent per batch
    pub pipeline_depth: usize,
    /// Wait for `ok` after every block
    pub flow_control: bool,
    /// Drop `;` comments before sending
    pub strip_comments: bool,
    /// Silence window (ms) for discarding device chatter
    pub settle_timeout_ms: u64,
    /// Arena size for reading the input file
    pub input_buffer_size: usize,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            pipeline_depth: 1,
            flow_control: true,
            strip_comments: true,
            settle_timeout_ms: 2500,
            input_buffer_size: 1 << 20,
        }
    }
}

impl StreamingSettings {
    /// Settle window as a duration
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }
}

/// What gets echoed while streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoSettings {
    /// Requests and responses
    pub communication: bool,
    /// Informational device messages
    pub unusual_messages: bool,
    /// Device errors
    pub errors: bool,
}

impl Default for EchoSettings {
    fn default() -> Self {
        Self {
            communication: true,
            unusual_messages: true,
            errors: true,
        }
    }
}

/// Complete settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Streaming settings
    pub streaming: StreamingSettings,
    /// Echo settings
    pub echo: EchoSettings,
}

#[derive(Clone, Copy)]
enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        _ => Err(SettingsError::UnsupportedFormat(path.to_path_buf())),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-user settings file location
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
            .ok_or(SettingsError::NoConfigDirectory)
    }

    /// Load an explicit settings file, or the per-user one if present.
    ///
    /// A missing per-user file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load_or_default(path: Option<&Path>) -> SettingsResult<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }

        let path = match Self::default_path() {
            Ok(path) => path,
            Err(e) => {
                tracing::debug!("{}; using built-in defaults", e);
                return Ok(Self::default());
            }
        };
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            tracing::debug!("No settings at {}; using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, content).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.connection.descriptor.trim().is_empty() {
            return Err(SettingsError::invalid(
                "connection.descriptor",
                "must not be empty",
            ));
        }

        if self.streaming.pipeline_depth == 0 {
            return Err(SettingsError::invalid(
                "streaming.pipeline_depth",
                "must be at least 1",
            ));
        }

        if self.streaming.input_buffer_size < MIN_INPUT_BUFFER_SIZE {
            return Err(SettingsError::invalid(
                "streaming.input_buffer_size",
                format!("must be at least {MIN_INPUT_BUFFER_SIZE} bytes"),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert_eq!(config.connection.descriptor, "/dev/ttyACM0,b115200");
        assert_eq!(config.streaming.pipeline_depth, 1);
        assert_eq!(config.streaming.settle_timeout(), Duration::from_millis(2500));
        assert!(config.echo.errors);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config: Config = toml::from_str("[streaming]\npipeline_depth = 4\n").unwrap();
        assert_eq!(config.streaming.pipeline_depth, 4);
        assert!(config.streaming.flow_control);
        assert_eq!(config.connection, ConnectionSettings::default());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::new();
        config.streaming.pipeline_depth = 0;
        assert!(config.validate().is_err());

        let mut config = Config::new();
        config.streaming.input_buffer_size = 16;
        assert!(config.validate().is_err());

        let mut config = Config::new();
        config.connection.descriptor = " ".to_string();
        assert!(matches!(
            config.validate(),
            Err(SettingsError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_unknown_extension() {
        let err = Config::load_from_file(Path::new("settings.ini")).unwrap_err();
        assert!(matches!(err, SettingsError::UnsupportedFormat(_)));
    }
}

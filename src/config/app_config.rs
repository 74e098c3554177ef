use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bluetooth::dispatcher::DEFAULT_NAME_PREFIX;
use crate::bluetooth::protocol::DEFAULT_MTU;
use crate::bluetooth::retry::DEFAULT_MAX_RETRIES;
use crate::bluetooth::{CommandFrame, RetryPolicy, SessionConfig};
use crate::error::ConfigError;

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        };
        f.write_str(name)
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Advertised name prefix of devices to talk to
    pub name_prefix: String,

    /// Requested transfer unit on connect
    pub mtu: u16,

    /// Retries after a failed session
    pub max_retries: u32,

    /// Pause between session attempts in milliseconds
    pub retry_delay_ms: u64,

    /// Times the command frame is written per session
    pub command_repetitions: usize,

    /// Log verbosity
    pub log_level: LogLevel,

    /// Optional log file
    pub log_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            mtu: DEFAULT_MTU,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: 0,
            command_repetitions: 2,
            log_level: LogLevel::default(),
            log_file: None,
        }
    }
}

impl AppConfig {
    /// Session parameters for the sequencer
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            mtu: self.mtu,
            command: CommandFrame::standard(),
            command_repetitions: self.command_repetitions,
        }
    }

    /// Retry policy for the retry controller
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(self.max_retries)
            .with_delay(Duration::from_millis(self.retry_delay_ms))
    }

    /// Check values that would make sessions impossible
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name_prefix.is_empty() {
            return Err(ConfigError::Invalid {
                field: "name_prefix",
                reason: "must not be empty".to_string(),
            });
        }
        if self.mtu == 0 {
            return Err(ConfigError::Invalid {
                field: "mtu",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.command_repetitions == 0 {
            return Err(ConfigError::Invalid {
                field: "command_repetitions",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Load configuration from the default settings file
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&default_settings_path())
    }

    /// Load configuration from `path`, falling back to defaults if it is missing
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default settings file
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&default_settings_path())
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Get the default settings path
pub fn default_settings_path() -> PathBuf {
    dirs_next::config_dir()
        .map(|config_dir| config_dir.join("taggr-link").join("settings.json"))
        .unwrap_or_else(|| PathBuf::from("settings.json"))
}

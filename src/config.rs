//! Runtime configuration
//!
//! Stored as TOML. Every field has a default, so a missing file or a file
//! with only some keys set is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dcihid_transport::protocol::{timing, DEFAULT_REPORT_ID};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "DCIHID_CONFIG";

/// Errors loading or saving the config file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Register engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DciConfig {
    /// Bound on waiting for a response, in milliseconds
    pub response_timeout_ms: u64,
    /// Wait for the card to acknowledge each write
    pub write_ack: bool,
    /// HID report ID prefixed to every request
    pub report_id: u8,
    /// Print every frame to stderr
    pub monitor: bool,
}

impl Default for DciConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: timing::RESPONSE_TIMEOUT_MS,
            write_ack: true,
            report_id: DEFAULT_REPORT_ID,
            monitor: false,
        }
    }
}

impl DciConfig {
    /// Get default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dcihid")
            .join("config.toml")
    }

    /// Pick the config path: explicit argument, then `$DCIHID_CONFIG`, then the default
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => Self::default_path(),
        }
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_write_ack(mut self, ack: bool) -> Self {
        self.write_ack = ack;
        self
    }
}

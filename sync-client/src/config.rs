//! Engine configuration.
//!
//! Configuration is loaded from a TOML file. Every field has a default, so
//! an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use sitesync_core::CategoryFilter;
use sitesync_types::InitConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Run the engine at all (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Seconds between fetches (default: 60).
    #[serde(default = "default_fetch_interval_secs")]
    pub fetch_interval_secs: u64,
    /// Name announced in this device's record (default: host name).
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Per-category switches.
    #[serde(default)]
    pub categories: CategoryFilter,
    /// Settings forwarded to the sync backend.
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Settings forwarded to the sync backend in `GOT_INIT_DATA`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend server URL; the backend's own default when unset.
    #[serde(default)]
    pub server_url: Option<String>,
    /// Backend API version (default: "0").
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Verbose backend diagnostics (default: false).
    #[serde(default)]
    pub debug: bool,
}

// Default value functions
fn default_enabled() -> bool {
    true
}

fn default_fetch_interval_secs() -> u64 {
    60
}

fn default_device_name() -> String {
    sysinfo::System::host_name()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "sitesync device".to_string())
}

fn default_api_version() -> String {
    "0".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            fetch_interval_secs: default_fetch_interval_secs(),
            device_name: default_device_name(),
            categories: CategoryFilter::default(),
            backend: BackendConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            api_version: default_api_version(),
            debug: false,
        }
    }
}

impl BackendConfig {
    /// The config block sent to the backend.
    pub fn init_config(&self) -> InitConfig {
        InitConfig {
            api_version: self.api_version.clone(),
            server_url: self.server_url.clone(),
            debug: self.debug,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "fetch_interval_secs",
                reason: "must be at least 1".into(),
            });
        }
        if self.device_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "device_name",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    /// The poll interval.
    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs.max(1))
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

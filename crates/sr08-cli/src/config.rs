//! CLI configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Tool configuration, loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Collector backend settings.
    pub collector: CollectorConfig,
    /// Ring settings.
    pub device: DeviceConfig,
    /// Background collection settings.
    pub collection: CollectionConfig,
    /// Storage settings.
    pub storage: StorageConfig,
}

/// Collector backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Upload endpoint.
    pub upload_url: String,
    /// Token refresh endpoint.
    pub auth_url: String,
    /// Account the uploads belong to.
    pub user_id: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            upload_url: String::new(),
            auth_url: String::new(),
            user_id: String::new(),
        }
    }
}

/// Ring settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// MAC address of the paired ring.
    pub mac: String,
}

/// Background collection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Minutes between background cycles.
    pub period_minutes: u64,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self { period_minutes: 30 }
    }
}

/// Storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database path; empty means the platform default.
    pub path: String,
}

impl StorageConfig {
    /// Resolved database path.
    pub fn db_path(&self) -> PathBuf {
        if self.path.is_empty() {
            sr08_store::default_db_path()
        } else {
            PathBuf::from(&self.path)
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl Config {
    /// Load configuration from the default path, falling back to defaults
    /// when no file exists.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate settings needed to talk to a real ring and collector.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [
            ("collector.upload_url", &self.collector.upload_url),
            ("collector.auth_url", &self.collector.auth_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be an http(s) URL, got '{url}'"
                )));
            }
        }
        if self.collector.user_id.is_empty() {
            return Err(ConfigError::Invalid(
                "collector.user_id must not be empty".to_string(),
            ));
        }
        if self.device.mac.is_empty() {
            return Err(ConfigError::Invalid(
                "device.mac must not be empty".to_string(),
            ));
        }
        if !(1..=1440).contains(&self.collection.period_minutes) {
            return Err(ConfigError::Invalid(format!(
                "collection.period_minutes must be between 1 and 1440, got {}",
                self.collection.period_minutes
            )));
        }
        Ok(())
    }
}

/// Default configuration path following platform conventions.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sr08")
        .join("config.toml")
}

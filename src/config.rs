//! Configuration management for the protocol registry
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (protocols.toml)
//! - Environment variables (PROTOCOLS__*)
//!
//! ## Example config file (protocols.toml):
//! ```toml
//! [store]
//! path = "./registry"
//!
//! [validation]
//! max_bits = 64
//! initial_change_note = "initial version"
//! naming_pattern = "^[a-z][a-z0-9]*(_[a-z0-9]+)*$"
//!
//! [staging]
//! max_age_hours = 168
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub staging: StagingConfig,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory of the filesystem store
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Widest encodable value
    #[serde(default = "default_max_bits")]
    pub max_bits: u32,

    /// Change note accepted for a path's first version
    #[serde(default = "default_initial_change_note")]
    pub initial_change_note: String,

    /// Naming convention checked before review
    #[serde(default = "default_naming_pattern")]
    pub naming_pattern: String,
}

/// Staging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Open submissions older than this are rejected; 0 disables expiry
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("registry")
}

fn default_max_bits() -> u32 {
    64
}

fn default_initial_change_note() -> String {
    "initial version".to_string()
}

fn default_naming_pattern() -> String {
    "^[a-z][a-z0-9]*(_[a-z0-9]+)*$".to_string()
}

fn default_max_age_hours() -> u64 {
    168
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_bits: default_max_bits(),
            initial_change_note: default_initial_change_note(),
            naming_pattern: default_naming_pattern(),
        }
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            max_age_hours: default_max_age_hours(),
        }
    }
}

impl StagingConfig {
    /// Expiry window, if enabled. Fails when the window does not fit a
    /// `chrono::Duration`.
    pub fn max_age(&self) -> Result<Option<chrono::Duration>, ConfigError> {
        if self.max_age_hours == 0 {
            return Ok(None);
        }
        i64::try_from(self.max_age_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .map(Some)
            .ok_or_else(|| {
                ConfigError::Message(format!(
                    "staging.max_age_hours = {} is out of range",
                    self.max_age_hours
                ))
            })
    }
}

impl RegistryConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a specific file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["protocols.toml", ".protocols.toml", "config/protocols.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "protocols", "registry") {
            let xdg_config = config_dir.config_dir().join("protocols.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("PROTOCOLS")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.staging.max_age()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = self
            .to_toml()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert_eq!(config.validation.max_bits, 64);
        assert_eq!(config.validation.initial_change_note, "initial version");
        assert_eq!(
            config.staging.max_age().unwrap(),
            Some(chrono::Duration::hours(168))
        );
    }

    #[test]
    fn test_zero_age_disables_expiry() {
        let staging = StagingConfig { max_age_hours: 0 };
        assert!(staging.max_age().unwrap().is_none());
    }

    #[test]
    fn test_oversized_age_is_an_error() {
        let staging = StagingConfig {
            max_age_hours: u64::MAX,
        };
        assert!(staging.max_age().is_err());
        let staging = StagingConfig {
            max_age_hours: i64::MAX as u64,
        };
        assert!(staging.max_age().is_err());
    }

    #[test]
    fn test_load_rejects_oversized_age() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oversized.toml");
        std::fs::write(&path, "[staging]\nmax_age_hours = 9223372036854775807\n").unwrap();
        let err = RegistryConfig::load_from(path.to_str()).unwrap_err();
        assert!(err.to_string().contains("max_age_hours"));
    }

    #[test]
    fn test_serialize_config() {
        let toml_str = RegistryConfig::default().to_toml().unwrap();
        assert!(toml_str.contains("[store]"));
        assert!(toml_str.contains("[validation]"));
        assert!(toml_str.contains("[staging]"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: RegistryConfig = toml::from_str("[validation]\nmax_bits = 16\n").unwrap();
        assert_eq!(config.validation.max_bits, 16);
        assert_eq!(config.validation.initial_change_note, "initial version");
        assert_eq!(config.store.path, PathBuf::from("registry"));
    }
}

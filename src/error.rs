//! Error types for the protocol registry

use thiserror::Error;

use crate::path::RegistryPath;
use crate::resolver::ValidationError;
use crate::staging::SubmissionId;
use crate::version::ProtocolVersion;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Protocol registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Protocol not found: {path} version {version}")]
    NotFound { path: String, version: String },

    #[error("Submission not found: {0}")]
    SubmissionNotFound(SubmissionId),

    #[error("Archive immutability violation: cannot overwrite {path} v{version}")]
    ImmutabilityViolation { path: String, version: String },

    #[error("Invalid payload format: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("Semver error: {0}")]
    Semver(#[from] semver::Error),
}

impl RegistryError {
    pub(crate) fn not_found(path: &RegistryPath, version: Option<&ProtocolVersion>) -> Self {
        Self::NotFound {
            path: path.to_string(),
            version: version
                .map(|v| v.to_string())
                .unwrap_or_else(|| "final".to_string()),
        }
    }

    /// True for errors a caller may retry unchanged (store I/O)
    pub fn is_transient(&self) -> bool {
        matches!(self, RegistryError::Io(_))
    }
}

//! Error types for configuration loading

use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file does not exist
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML in {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Content parsed but has the wrong shape
    #[error("{message}")]
    Invalid { message: String },

    /// One entry of the scene list has a value of the wrong type
    #[error("invalid scene {index} ({name}) in {}: {reason}", path.display())]
    InvalidScene {
        path: PathBuf,
        index: usize,
        name: String,
        reason: String,
    },

    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

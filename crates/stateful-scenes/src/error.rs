//! Error types for scene setup and scene actions

use scenes_config::ConfigError;
use scenes_service_registry::ServiceError;
use std::path::PathBuf;
use thiserror::Error;

pub type SceneResult<T> = Result<T, SceneError>;

#[derive(Debug, Error)]
pub enum SceneError {
    /// The scene list could not be found
    #[error("No scenes file {}", path.display())]
    ConfigNotFound { path: PathBuf },

    /// The scene list or one of its entries is malformed
    #[error("{0}")]
    ConfigInvalid(String),

    /// No platform scene could be found to activate
    #[error("Cannot find entity_id for: {scene}")]
    TargetUnresolved { scene: String },

    /// A platform action failed
    #[error(transparent)]
    Action(#[from] ServiceError),
}

impl From<ConfigError> for SceneError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound { path } => SceneError::ConfigNotFound { path },
            other => SceneError::ConfigInvalid(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_mapping() {
        let err: SceneError = ConfigError::NotFound {
            path: PathBuf::from("/config/scenes.yaml"),
        }
        .into();
        assert!(matches!(err, SceneError::ConfigNotFound { .. }));
        assert_eq!(err.to_string(), "No scenes file /config/scenes.yaml");

        let err: SceneError = ConfigError::Invalid {
            message: "No scenes found in /config/scenes.yaml".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "No scenes found in /config/scenes.yaml");
    }
}

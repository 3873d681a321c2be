//! Hub options
//!
//! ```yaml
//! scene_path: scenes.yaml
//! number_tolerance: 1
//! restore_states_on_deactivate: false
//! transition_time: 1
//! debounce_time: 0
//! ignore_unavailable: false
//! enable_discovery: true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml_file;

const TOLERANCE_MAX: f64 = 10.0;
const DURATION_MAX: f64 = 300.0;

/// Options shared by every scene of a hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Scene list; relative paths are resolved against the options file
    pub scene_path: PathBuf,

    /// Default numeric fuzz for attribute comparison
    pub number_tolerance: f64,

    pub restore_states_on_deactivate: bool,

    /// Seconds the platform is asked to take when applying a scene
    pub transition_time: f64,

    /// Extra settle seconds after a transition before re-evaluating
    pub debounce_time: f64,

    pub ignore_unavailable: bool,

    /// Offer platform scenes not in the scene list for learning
    pub enable_discovery: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            scene_path: PathBuf::from("scenes.yaml"),
            number_tolerance: 1.0,
            restore_states_on_deactivate: false,
            transition_time: 1.0,
            debounce_time: 0.0,
            ignore_unavailable: false,
            enable_discovery: true,
        }
    }
}

impl HubConfig {
    /// Parse hub options from a YAML value; a null document means defaults
    pub fn from_yaml(yaml: serde_yaml::Value) -> ConfigResult<Self> {
        if yaml.is_null() {
            return Ok(Self::default());
        }
        let config: HubConfig =
            serde_yaml::from_value(yaml).map_err(|e| ConfigError::InvalidValue {
                key: "root".to_string(),
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every numeric option against its allowed range
    pub fn validate(&self) -> ConfigResult<()> {
        check_range("number_tolerance", self.number_tolerance, TOLERANCE_MAX)?;
        check_range("transition_time", self.transition_time, DURATION_MAX)?;
        check_range("debounce_time", self.debounce_time, DURATION_MAX)?;
        Ok(())
    }
}

fn check_range(key: &str, value: f64, max: f64) -> ConfigResult<()> {
    if !value.is_finite() || !(0.0..=max).contains(&value) {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("{} is outside 0..={}", value, max),
        });
    }
    Ok(())
}

/// Load hub options from `path` and resolve `scene_path` next to it
pub fn load_hub_config(path: impl AsRef<Path>) -> ConfigResult<HubConfig> {
    let path = path.as_ref();
    let mut config = HubConfig::from_yaml(load_yaml_file(path)?)?;

    if config.scene_path.is_relative() {
        if let Some(dir) = path.parent() {
            config.scene_path = dir.join(&config.scene_path);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.scene_path, PathBuf::from("scenes.yaml"));
        assert_eq!(config.number_tolerance, 1.0);
        assert!(!config.restore_states_on_deactivate);
        assert_eq!(config.transition_time, 1.0);
        assert_eq!(config.debounce_time, 0.0);
        assert!(!config.ignore_unavailable);
        assert!(config.enable_discovery);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = serde_yaml::from_str("debounce_time: 0.5\nignore_unavailable: true").unwrap();
        let config = HubConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.debounce_time, 0.5);
        assert!(config.ignore_unavailable);
        assert_eq!(config.transition_time, 1.0);
    }

    #[test]
    fn test_out_of_range() {
        let yaml = serde_yaml::from_str("number_tolerance: 11").unwrap();
        let err = HubConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "number_tolerance"));

        let yaml = serde_yaml::from_str("transition_time: -1").unwrap();
        assert!(HubConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_wrong_type() {
        let yaml = serde_yaml::from_str("enable_discovery: sometimes").unwrap();
        assert!(matches!(
            HubConfig::from_yaml(yaml),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_scene_path_resolved_next_to_options() {
        let dir = TempDir::new().unwrap();
        let options = dir.path().join("stateful_scenes.yaml");
        fs::write(&options, "scene_path: my_scenes.yaml\n").unwrap();

        let config = load_hub_config(&options).unwrap();
        assert_eq!(config.scene_path, dir.path().join("my_scenes.yaml"));
    }

    #[test]
    fn test_empty_options_file() {
        let dir = TempDir::new().unwrap();
        let options = dir.path().join("stateful_scenes.yaml");
        fs::write(&options, "").unwrap();

        let config = load_hub_config(&options).unwrap();
        assert_eq!(config.scene_path, dir.path().join("scenes.yaml"));
    }
}

//! Raw YAML file reading

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::Value;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Read and parse a YAML file
///
/// A missing file is reported as [`ConfigError::NotFound`] so callers can
/// tell "nothing there" apart from "there but unreadable".
pub fn load_yaml_file(path: impl AsRef<Path>) -> ConfigResult<Value> {
    let path = path.as_ref();
    debug!("Loading YAML file: {:?}", path);

    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseYaml {
        path: path.to_path_buf(),
        source: e,
    })
}

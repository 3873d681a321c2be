//! Declarative scene list
//!
//! ```yaml
//! - id: "1700000000"
//!   name: Movie night
//!   icon: mdi:movie
//!   entities:
//!     light.living_room:
//!       state: "on"
//!       brightness: 80
//!     media_player.tv:
//!       state: playing
//!       source: HDMI 1
//! ```
//!
//! Every key is optional at this level so that validation can name exactly
//! what a broken entry is missing.

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml_file;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::info;

/// Desired state of one member entity: `state` plus any attributes
pub type MemberConfig = IndexMap<String, Value>;

/// One entry of the scene list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Unquoted numeric ids are kept as their decimal text
    #[serde(
        default,
        deserialize_with = "deserialize_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// Platform scene entity this scene activates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learn: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_tolerance: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<IndexMap<String, MemberConfig>>,
}

impl SceneConfig {
    /// Name used in log lines and error messages
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("<unnamed>")
    }
}

/// Load the scene list from `path`
///
/// A file that is not a non-empty list reports "No scenes found"; an entry
/// with a value of the wrong type is reported by position and name.
pub fn load_scenes_file(path: impl AsRef<Path>) -> ConfigResult<Vec<SceneConfig>> {
    let path = path.as_ref();
    let yaml = load_yaml_file(path).map_err(|e| match e {
        ConfigError::ParseYaml { .. } => no_scenes(path),
        other => other,
    })?;

    let entries = match yaml {
        serde_yaml::Value::Sequence(entries) if !entries.is_empty() => entries,
        _ => return Err(no_scenes(path)),
    };

    let scenes = entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            parse_entry(entry).map_err(|(name, reason)| ConfigError::InvalidScene {
                path: path.to_path_buf(),
                index,
                name,
                reason,
            })
        })
        .collect::<ConfigResult<Vec<_>>>()?;

    info!(count = scenes.len(), path = %path.display(), "Loaded scenes");
    Ok(scenes)
}

/// Interpret a parsed YAML document as a non-empty scene list
pub fn parse_scenes(yaml: serde_yaml::Value) -> ConfigResult<Vec<SceneConfig>> {
    let serde_yaml::Value::Sequence(entries) = yaml else {
        return Err(ConfigError::Invalid {
            message: "scene list must be a YAML sequence".to_string(),
        });
    };

    if entries.is_empty() {
        return Err(ConfigError::Invalid {
            message: "scene list is empty".to_string(),
        });
    }

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            parse_entry(entry).map_err(|(name, reason)| ConfigError::Invalid {
                message: format!("invalid scene {} ({}): {}", index, name, reason),
            })
        })
        .collect()
}

/// Decode one entry; on failure return the best name for it and the reason
fn parse_entry(entry: serde_yaml::Value) -> Result<SceneConfig, (String, String)> {
    let name = entry_name(&entry);
    serde_yaml::from_value(entry).map_err(|e| (name, e.to_string()))
}

fn entry_name(entry: &serde_yaml::Value) -> String {
    ["name", "id"]
        .iter()
        .filter_map(|key| entry.get(*key))
        .find_map(|value| match value {
            serde_yaml::Value::String(s) => Some(s.clone()),
            serde_yaml::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| "<unnamed>".to_string())
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<RawId>::deserialize(deserializer)?.map(|raw| match raw {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    }))
}

fn no_scenes(path: &Path) -> ConfigError {
    ConfigError::Invalid {
        message: format!("No scenes found in {}", path.display()),
    }
}

//! YAML configuration for stateful scenes
//!
//! Two files are read here:
//!
//! - the scene list (`scenes.yaml`), a sequence of scene entries each naming
//!   the platform scene it wraps and the desired state of its members
//! - the hub options file, which points at the scene list and carries the
//!   defaults applied to every scene
//!
//! # Example
//!
//! ```ignore
//! use scenes_config::{load_hub_config, load_scenes_file};
//!
//! let hub = load_hub_config("/config/stateful_scenes.yaml")?;
//! let scenes = load_scenes_file(&hub.scene_path)?;
//! ```

mod error;
mod hub_config;
mod loader;
mod scenes;

pub use error::{ConfigError, ConfigResult};
pub use hub_config::{load_hub_config, HubConfig};
pub use loader::load_yaml_file;
pub use scenes::{load_scenes_file, parse_scenes, MemberConfig, SceneConfig};

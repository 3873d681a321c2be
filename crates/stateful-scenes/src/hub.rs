//! The set of scenes built from one scene list

use indexmap::IndexMap;
use scenes_config::{load_scenes_file, HubConfig, MemberConfig, SceneConfig};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::definition::{MemberState, SceneDefinition};
use crate::error::{SceneError, SceneResult};
use crate::host::{SceneHost, StateProvider};
use crate::scene::{find_scene_by_id, Scene, SceneOptions};

pub struct Hub {
    host: SceneHost,
    /// Default tolerance for scenes that don't set their own
    number_tolerance: f64,
    options: SceneOptions,
    scenes: Vec<Arc<Scene>>,
}

impl Hub {
    /// Build a scene for every entry, failing on the first invalid one
    ///
    /// Must be called from within the runtime that drives `host`.
    pub fn new(
        host: SceneHost,
        scene_confs: Vec<SceneConfig>,
        number_tolerance: f64,
    ) -> SceneResult<Self> {
        Self::with_options(host, scene_confs, number_tolerance, SceneOptions::default())
    }

    /// Like [`Hub::new`] with the starting flags for every scene
    pub fn with_options(
        host: SceneHost,
        scene_confs: Vec<SceneConfig>,
        number_tolerance: f64,
        options: SceneOptions,
    ) -> SceneResult<Self> {
        let mut hub = Self {
            host,
            number_tolerance,
            options,
            scenes: Vec::new(),
        };

        // Validate everything before any scene subscribes
        let definitions = scene_confs
            .iter()
            .map(|conf| {
                hub.validate_scene(conf)?;
                Ok(hub.extract_scene_configuration(conf))
            })
            .collect::<SceneResult<Vec<_>>>()?;

        for definition in definitions {
            hub.add_scene(definition);
        }

        info!(scenes = hub.scenes.len(), "Scene hub ready");
        Ok(hub)
    }

    /// Load the scene list named by `config` and apply its defaults
    pub fn from_config(host: SceneHost, config: &HubConfig) -> SceneResult<Self> {
        let scene_confs = load_scenes_file(&config.scene_path)?;
        let options = SceneOptions {
            restore_on_deactivate: config.restore_states_on_deactivate,
            transition_time: config.transition_time,
            debounce_time: config.debounce_time,
            ignore_unavailable: config.ignore_unavailable,
            ignore_attributes: false,
        };
        Self::with_options(host, scene_confs, config.number_tolerance, options)
    }

    fn add_scene(&mut self, definition: SceneDefinition) -> Arc<Scene> {
        debug!(scene = %definition.name, members = definition.members.len(), "Adding scene");
        let scene = Scene::new(self.host.clone(), definition, self.options.clone());
        self.scenes.push(Arc::clone(&scene));
        scene
    }

    /// Check that an entry has everything needed to build a scene
    pub fn validate_scene(&self, conf: &SceneConfig) -> SceneResult<()> {
        let name = conf.display_name();

        if conf.name.is_none() {
            return Err(SceneError::ConfigInvalid(format!(
                "Scene is missing name: {}",
                name
            )));
        }

        let Some(entities) = &conf.entities else {
            return Err(SceneError::ConfigInvalid(format!(
                "Scene is missing entities: {}",
                name
            )));
        };

        if conf.id.is_none() {
            return Err(SceneError::ConfigInvalid(format!(
                "Scene is missing id: {}",
                name
            )));
        }

        for (entity_id, attributes) in entities {
            if MemberState::from_raw(entity_id, attributes).is_none() {
                return Err(SceneError::ConfigInvalid(format!(
                    "Scene is missing state for entity {}: {}",
                    entity_id, name
                )));
            }
        }

        Ok(())
    }

    /// Turn a validated entry into a definition
    pub fn extract_scene_configuration(&self, conf: &SceneConfig) -> SceneDefinition {
        let members = conf
            .entities
            .iter()
            .flatten()
            .filter_map(|(entity_id, raw)| {
                MemberState::from_raw(entity_id, raw).map(|member| (entity_id.clone(), member))
            })
            .collect();

        let id = conf.id.clone().unwrap_or_default();
        let activation_target = conf
            .entity_id
            .clone()
            .or_else(|| find_scene_by_id(self.host.states.as_ref(), &id));

        let icon = conf
            .icon
            .clone()
            .or_else(|| activation_target.as_deref().and_then(|t| self.icon_for(t)));
        let area = conf.area.clone().or_else(|| {
            activation_target
                .as_deref()
                .and_then(|t| self.host.metadata.area_name(t))
        });

        SceneDefinition {
            name: conf.display_name().to_string(),
            id,
            activation_target,
            icon,
            area,
            learn: conf.learn.unwrap_or(false),
            members,
            number_tolerance: conf.number_tolerance.unwrap_or(self.number_tolerance),
        }
    }

    /// Entry for a platform scene whose members were captured live
    pub fn prepare_external_scene(
        &self,
        target: &str,
        entities: IndexMap<String, MemberConfig>,
    ) -> SceneConfig {
        let registry = self.host.metadata.entity(target);
        let state = self.host.states.get(target);

        let name = registry
            .as_ref()
            .and_then(|e| e.display_name().map(String::from))
            .or_else(|| {
                state
                    .as_ref()
                    .and_then(|s| s.attribute_str("friendly_name").map(String::from))
            })
            .unwrap_or_else(|| target.to_string());

        let id = state
            .as_ref()
            .and_then(|s| s.attribute_str("id").map(String::from))
            .or_else(|| registry.as_ref().and_then(|e| e.unique_id.clone()))
            .unwrap_or_else(|| target.to_string());

        SceneConfig {
            id: Some(id),
            name: Some(name),
            icon: self.icon_for(target),
            entity_id: Some(target.to_string()),
            area: self.host.metadata.area_name(target),
            learn: Some(true),
            number_tolerance: None,
            entities: Some(entities),
        }
    }

    /// Capture the live state of `entity_ids` and build a scene around
    /// the platform scene `target`
    #[instrument(skip(self, entity_ids))]
    pub fn learn_external_scene(
        &mut self,
        target: &str,
        entity_ids: &[String],
    ) -> SceneResult<Arc<Scene>> {
        let captured = Scene::learn_scene_states(self.host.states.as_ref(), entity_ids);
        let conf = self.prepare_external_scene(target, captured);
        self.validate_scene(&conf)?;
        let definition = self.extract_scene_configuration(&conf);
        info!(scene = %definition.name, members = definition.members.len(), "Learned scene");
        Ok(self.add_scene(definition))
    }

    /// Registry icon, else the icon the platform reports
    fn icon_for(&self, entity_id: &str) -> Option<String> {
        self.host
            .metadata
            .entity(entity_id)
            .and_then(|e| e.icon.clone())
            .or_else(|| {
                self.host
                    .states
                    .get(entity_id)
                    .and_then(|s| s.attribute_str("icon").map(String::from))
            })
    }

    pub fn scenes(&self) -> &[Arc<Scene>] {
        &self.scenes
    }

    /// Activation targets of all scenes, in configuration order
    pub fn get_available_scenes(&self) -> Vec<String> {
        self.scenes
            .iter()
            .filter_map(|scene| scene.activation_target())
            .collect()
    }

    pub fn get_scene(&self, target: &str) -> Option<Arc<Scene>> {
        self.scenes
            .iter()
            .find(|scene| scene.activation_target().as_deref() == Some(target))
            .cloned()
    }

    /// `(target, name)` of every other scene, sorted by name
    pub fn available_off_scenes(&self, target: &str) -> Vec<(String, String)> {
        let mut options: Vec<_> = self
            .scenes
            .iter()
            .filter_map(|scene| {
                let other = scene.activation_target()?;
                (other != target).then(|| (other, scene.name().to_string()))
            })
            .collect();
        options.sort_by_key(|(_, name)| name.to_lowercase());
        options
    }

    /// Stop every scene
    pub fn shutdown(&self) {
        for scene in &self.scenes {
            scene.shutdown();
        }
    }
}

/// Off scene options for a scene outside any hub: every platform scene but
/// `exclude`, as `(entity_id, friendly name)` sorted by name
pub fn off_scene_candidates(states: &dyn StateProvider, exclude: &str) -> Vec<(String, String)> {
    let mut options: Vec<_> = states
        .domain_states("scene")
        .into_iter()
        .filter(|state| state.entity_id.to_string() != exclude)
        .map(|state| {
            let entity_id = state.entity_id.to_string();
            let name = state
                .attribute_str("friendly_name")
                .map(String::from)
                .unwrap_or_else(|| entity_id.clone());
            (entity_id, name)
        })
        .collect();
    options.sort_by_key(|(_, name)| name.to_lowercase());
    options
}

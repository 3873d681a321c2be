//! In-process platform the scenes run against
//!
//! Owns the bus, state store, service registry and registries, and answers
//! the three actions scenes issue by writing the requested states straight
//! into the store. Platform scenes are plain `{entity_id: {state, ...}}`
//! maps, either from the fixture or derived from the configured scenes.

use anyhow::{Context as _, Result};
use dashmap::DashMap;
use scenes_core::{Context, EntityId, ServiceCall, STATE_OFF, STATE_ON};
use scenes_event_bus::EventBus;
use scenes_registries::{Registries, RegistriesData};
use scenes_service_registry::{ServiceError, ServiceRegistry, ServiceResult};
use scenes_state_store::StateStore;
use serde::Deserialize;
use serde_json::{Map, Value};
use stateful_scenes::{SceneDefinition, SceneHost};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Initial platform contents
#[derive(Debug, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub states: Vec<FixtureState>,

    /// Platform scenes by entity id
    #[serde(default)]
    pub scenes: HashMap<String, Map<String, Value>>,

    #[serde(default)]
    pub registries: RegistriesData,
}

#[derive(Debug, Deserialize)]
pub struct FixtureState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

/// Read a JSON fixture
pub fn load_fixture(path: &Path) -> Result<Fixture> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid fixture {}", path.display()))
}

type PlatformScenes = Arc<DashMap<String, Map<String, Value>>>;

pub struct SimulatedPlatform {
    pub bus: Arc<EventBus>,
    pub states: Arc<StateStore>,
    pub services: Arc<ServiceRegistry>,
    pub registries: Arc<Registries>,
    scenes: PlatformScenes,
}

impl SimulatedPlatform {
    pub fn new(fixture: Fixture) -> Result<Self> {
        let bus = Arc::new(EventBus::new());
        let states = Arc::new(StateStore::new(bus.clone()));
        let services = Arc::new(ServiceRegistry::with_event_bus(bus.clone()));
        let registries = Arc::new(Registries::from_data(fixture.registries));

        for seeded in fixture.states {
            let entity_id: EntityId = seeded
                .entity_id
                .parse()
                .with_context(|| format!("invalid entity_id in fixture: {}", seeded.entity_id))?;
            states.set(entity_id, seeded.state, seeded.attributes, Context::new());
        }

        let platform = Self {
            bus,
            states,
            services,
            registries,
            scenes: Arc::new(fixture.scenes.into_iter().collect()),
        };
        platform.register_services();

        info!(
            entities = platform.states.entity_count(),
            scenes = platform.scenes.len(),
            "Simulated platform ready"
        );
        Ok(platform)
    }

    pub fn host(&self) -> SceneHost {
        SceneHost::new(
            self.bus.clone(),
            self.states.clone(),
            self.services.clone(),
            self.registries.clone(),
        )
    }

    /// Members of a platform scene
    pub fn scene_members(&self, target: &str) -> Option<Vec<String>> {
        self.scenes
            .get(target)
            .map(|entities| entities.keys().cloned().collect())
    }

    /// Make `target` apply `definition` unless the platform already knows it
    pub fn define_scene(&self, target: &str, definition: &SceneDefinition) {
        if self.scenes.contains_key(target) {
            return;
        }

        let entities = definition
            .members
            .iter()
            .map(|(entity_id, member)| {
                let mut entry = Map::new();
                entry.insert("state".to_string(), Value::String(member.state.clone()));
                for (key, value) in &member.attributes {
                    entry.insert(key.clone(), value.clone());
                }
                (entity_id.clone(), Value::Object(entry))
            })
            .collect();

        debug!(target = %target, "Defining platform scene");
        self.scenes.insert(target.to_string(), entities);
    }

    fn register_services(&self) {
        let states = self.states.clone();
        let scenes = self.scenes.clone();
        self.services
            .register("scene", "turn_on", move |call: ServiceCall| {
                let states = states.clone();
                let scenes = scenes.clone();
                async move { turn_on_scenes(&states, &scenes, &call) }
            });

        let states = self.states.clone();
        self.services
            .register("scene", "apply", move |call: ServiceCall| {
                let states = states.clone();
                async move {
                    let entities = call
                        .service_data
                        .get("entities")
                        .and_then(Value::as_object)
                        .ok_or_else(|| {
                            ServiceError::InvalidData("scene.apply needs entities".to_string())
                        })?;
                    apply_entities(&states, entities, &call.context)
                }
            });

        let states = self.states.clone();
        self.services
            .register("homeassistant", "turn_off", move |call: ServiceCall| {
                let states = states.clone();
                async move { turn_off(&states, &call) }
            });
    }
}

fn turn_on_scenes(states: &StateStore, scenes: &PlatformScenes, call: &ServiceCall) -> ServiceResult {
    for target in call.entity_ids() {
        let entities = scenes
            .get(&target)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::CallFailed(format!("unknown scene {}", target)))?;
        info!(scene = %target, "Applying platform scene");
        apply_entities(states, &entities, &call.context)?;
    }
    Ok(None)
}

/// Write each `{state, ...attributes}` entry over the current state
#[instrument(skip(states, entities, context), fields(entities = entities.len()))]
fn apply_entities(
    states: &StateStore,
    entities: &Map<String, Value>,
    context: &Context,
) -> ServiceResult {
    for (entity_id, desired) in entities {
        let parsed: EntityId = entity_id
            .parse()
            .map_err(|e| ServiceError::InvalidData(format!("{}: {}", entity_id, e)))?;
        let desired = desired
            .as_object()
            .ok_or_else(|| ServiceError::InvalidData(format!("{}: not a mapping", entity_id)))?;

        let current = states.get(entity_id);
        let state = match desired.get("state") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Bool(true)) => STATE_ON.to_string(),
            Some(Value::Bool(false)) => STATE_OFF.to_string(),
            _ => current
                .as_ref()
                .map(|s| s.state.clone())
                .ok_or_else(|| ServiceError::InvalidData(format!("{}: no state", entity_id)))?,
        };

        let mut attributes = current.map(|s| s.attributes).unwrap_or_default();
        for (key, value) in desired {
            if key != "state" {
                attributes.insert(key.clone(), value.clone());
            }
        }

        states.set(parsed, state, attributes, context.child());
    }
    Ok(None)
}

fn turn_off(states: &StateStore, call: &ServiceCall) -> ServiceResult {
    for entity_id in call.entity_ids() {
        let Some(current) = states.get(&entity_id) else {
            debug!(entity_id = %entity_id, "Nothing to turn off");
            continue;
        };
        states.set(
            current.entity_id.clone(),
            STATE_OFF,
            current.attributes.clone(),
            call.context.child(),
        );
    }
    Ok(None)
}

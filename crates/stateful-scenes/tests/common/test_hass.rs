//! Test platform instance
//!
//! Owns a real bus, state store, service registry and registries, and
//! records every action a scene issues instead of carrying it out.

#![allow(dead_code)]

use scenes_config::SceneConfig;
use scenes_core::{Context, EntityId, ServiceCall, State};
use scenes_event_bus::EventBus;
use scenes_registries::Registries;
use scenes_service_registry::ServiceRegistry;
use scenes_state_store::StateStore;
use stateful_scenes::{Scene, SceneHost, SceneOptions};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Actions scenes may call
const RECORDED_SERVICES: &[(&str, &str)] = &[
    ("scene", "turn_on"),
    ("scene", "apply"),
    ("homeassistant", "turn_off"),
];

pub struct TestHomeAssistant {
    pub bus: Arc<EventBus>,
    pub states: Arc<StateStore>,
    pub services: Arc<ServiceRegistry>,
    pub registries: Arc<Registries>,
    captured_service_calls: Arc<Mutex<Vec<ServiceCall>>>,
}

impl TestHomeAssistant {
    pub fn new() -> Self {
        let bus = Arc::new(EventBus::new());
        let states = Arc::new(StateStore::new(bus.clone()));
        let services = Arc::new(ServiceRegistry::with_event_bus(bus.clone()));
        let captured_service_calls = Arc::new(Mutex::new(Vec::new()));

        for (domain, service) in RECORDED_SERVICES {
            let sink = captured_service_calls.clone();
            services.register(*domain, *service, move |call: ServiceCall| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(call);
                    Ok(None)
                }
            });
        }

        Self {
            bus,
            states,
            services,
            registries: Arc::new(Registries::new()),
            captured_service_calls,
        }
    }

    pub fn host(&self) -> SceneHost {
        SceneHost::new(
            self.bus.clone(),
            self.states.clone(),
            self.services.clone(),
            self.registries.clone(),
        )
    }

    /// Set the state of an entity; `attributes` must be a JSON object
    pub fn set_state(&self, entity_id: &str, state: &str, attributes: serde_json::Value) -> State {
        let entity_id: EntityId = entity_id.parse().expect("Invalid entity_id");
        let attributes: HashMap<String, serde_json::Value> =
            serde_json::from_value(attributes).expect("attributes must be an object");
        self.states.set(entity_id, state, attributes, Context::new())
    }

    pub fn get_state(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id)
    }

    /// Register a platform scene entity carrying the given `id` attribute
    pub fn add_platform_scene(&self, entity_id: &str, id: &str, friendly_name: &str) {
        self.set_state(
            entity_id,
            "2024-01-01T00:00:00+00:00",
            serde_json::json!({"id": id, "friendly_name": friendly_name}),
        );
    }

    /// Build a scene from a JSON scene entry
    pub fn scene(&self, conf: serde_json::Value, options: SceneOptions) -> Arc<Scene> {
        let conf: SceneConfig = serde_json::from_value(conf).expect("Invalid scene config");
        let hub = stateful_scenes::Hub::with_options(self.host(), vec![conf], 1.0, options)
            .expect("Scene config rejected");
        hub.scenes()[0].clone()
    }

    /// Let bus deliveries and zero-delay calls run
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    pub fn captured_service_calls(&self) -> Vec<ServiceCall> {
        self.captured_service_calls.lock().unwrap().clone()
    }

    /// Captured calls of one `domain.service`
    pub fn service_calls(&self, domain: &str, service: &str) -> Vec<ServiceCall> {
        self.captured_service_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.domain == domain && c.service == service)
            .cloned()
            .collect()
    }

    pub fn clear_service_calls(&self) {
        self.captured_service_calls.lock().unwrap().clear();
    }

    pub fn assert_state(&self, entity_id: &str, expected: &str) {
        let state = self.states.get_state(entity_id);
        assert_eq!(
            state.as_deref(),
            Some(expected),
            "Expected entity {} to be in state '{}', but was {:?}",
            entity_id,
            expected,
            state
        );
    }
}

impl Default for TestHomeAssistant {
    fn default() -> Self {
        Self::new()
    }
}

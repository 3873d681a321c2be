//! Entity state storage with domain indexing
//!
//! The store holds the current [`State`] of every entity, keeps a per-domain
//! index so scene discovery can list `scene.*` cheaply, and fires
//! `state_changed` on the bus for every effective write.

use dashmap::DashMap;
use scenes_core::events::StateChangedData;
use scenes_core::{Context, EntityId, State};
use scenes_event_bus::EventBus;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

pub struct StateStore {
    /// All entity states keyed by entity_id string
    states: DashMap<String, State>,
    /// Entity ids by domain, in first-write order
    domain_index: DashMap<String, Vec<String>>,
    event_bus: Arc<EventBus>,
}

impl StateStore {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            states: DashMap::new(),
            domain_index: DashMap::new(),
            event_bus,
        }
    }

    /// Set the state of an entity
    ///
    /// A write that leaves both the state value and the attributes untouched
    /// is dropped without firing an event. Otherwise `state_changed` is fired
    /// with the old and new state.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> State {
        let entity_id_str = entity_id.to_string();
        let state = state.into();

        let old_state = self.get(&entity_id_str);

        if let Some(existing) = &old_state {
            if existing.state == state && existing.attributes == attributes {
                trace!("State unchanged, skipping write");
                return existing.clone();
            }
        }

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes, context.clone()),
            None => State::new(entity_id.clone(), state, attributes, context.clone()),
        };

        debug!(
            state = %new_state.state,
            changed = old_state.as_ref().map(|s| s.state != new_state.state).unwrap_or(true),
            "Setting entity state"
        );

        self.states.insert(entity_id_str.clone(), new_state.clone());

        if old_state.is_none() {
            self.domain_index
                .entry(entity_id.domain().to_string())
                .or_default()
                .push(entity_id_str);
        }

        self.event_bus.fire_typed(
            StateChangedData {
                entity_id,
                old_state,
                new_state: Some(new_state.clone()),
            },
            context,
        );

        new_state
    }

    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// State value only, or None if the entity doesn't exist
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get_state(entity_id).as_deref() == Some(state)
    }

    pub fn entity_ids(&self, domain: &str) -> Vec<String> {
        self.domain_index
            .get(domain)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn domain_states(&self, domain: &str) -> Vec<State> {
        self.entity_ids(domain)
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// First entity in `domain` whose attribute `key` equals `value`
    ///
    /// Scene configurations reference platform scenes by their `id`
    /// attribute, so this is how a scene id is turned into an entity id.
    pub fn find_by_attribute(
        &self,
        domain: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Option<State> {
        self.domain_states(domain)
            .into_iter()
            .find(|state| state.attributes.get(key) == Some(value))
    }

    /// Remove an entity's state, firing `state_changed` with no new state
    #[instrument(skip(self, context), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId, context: Context) -> Option<State> {
        let entity_id_str = entity_id.to_string();

        let old_state = self.states.remove(&entity_id_str).map(|(_, s)| s);

        if let Some(ref state) = old_state {
            trace!("Removing entity state");

            if let Some(mut ids) = self.domain_index.get_mut(entity_id.domain()) {
                ids.retain(|id| id != &entity_id_str);
            }

            self.event_bus.fire_typed(
                StateChangedData {
                    entity_id: entity_id.clone(),
                    old_state: Some(state.clone()),
                    new_state: None,
                },
                context,
            );
        }

        old_state
    }

    pub fn entity_count(&self) -> usize {
        self.states.len()
    }
}

pub type SharedStateStore = Arc<StateStore>;

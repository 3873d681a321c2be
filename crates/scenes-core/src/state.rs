//! Snapshot of one entity's state

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Context, EntityId, STATE_OFF, STATE_UNAVAILABLE};

/// State of an entity at one point in time
///
/// This is what the scene engine compares against a scene's desired member
/// state, and what it keeps around to restore on deactivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    /// The entity this state belongs to
    pub entity_id: EntityId,

    /// The state value ("on", "off", "closed", "playing", "unavailable", ...)
    pub state: String,

    /// Attributes reported with the state (brightness, rgb_color, ...)
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// When the state value last changed
    pub last_changed: DateTime<Utc>,

    /// When the state or any attribute was last written
    pub last_updated: DateTime<Utc>,

    /// Context of the write that produced this state
    pub context: Context,
}

impl State {
    pub fn new(
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            state: state.into(),
            attributes,
            last_changed: now,
            last_updated: now,
            context,
        }
    }

    /// Successor state; `last_changed` only moves if the state value moved
    pub fn with_update(
        &self,
        new_state: impl Into<String>,
        new_attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        let new_state = new_state.into();
        let last_changed = if self.state != new_state {
            now
        } else {
            self.last_changed
        };

        Self {
            entity_id: self.entity_id.clone(),
            state: new_state,
            attributes: new_attributes,
            last_changed,
            last_updated: now,
            context,
        }
    }

    /// Domain of the owning entity
    pub fn domain(&self) -> &str {
        self.entity_id.domain()
    }

    pub fn is_off(&self) -> bool {
        self.state == STATE_OFF
    }

    pub fn is_unavailable(&self) -> bool {
        self.state == STATE_UNAVAILABLE
    }

    /// Typed attribute lookup; `None` if missing or of another shape
    pub fn attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Attribute lookup as a string slice
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        // Timestamps and context are bookkeeping, not state
        self.entity_id == other.entity_id
            && self.state == other.state
            && self.attributes == other.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn light(state: &str, brightness: u8) -> State {
        State::new(
            "light.kitchen".parse().unwrap(),
            state,
            HashMap::from([("brightness".to_string(), json!(brightness))]),
            Context::new(),
        )
    }

    #[test]
    fn test_predicates() {
        let state = light("off", 0);
        assert!(state.is_off());
        assert!(!state.is_unavailable());
        assert_eq!(state.domain(), "light");

        let state = light("unavailable", 0);
        assert!(state.is_unavailable());
    }

    #[test]
    fn test_with_update_keeps_last_changed_for_attribute_only_change() {
        let first = light("on", 100);
        let second = first.with_update(
            "on",
            HashMap::from([("brightness".to_string(), json!(200))]),
            Context::new(),
        );
        assert_eq!(first.last_changed, second.last_changed);
        assert_eq!(second.attribute::<u8>("brightness"), Some(200));
    }

    #[test]
    fn test_equality_ignores_timestamps() {
        let a = light("on", 100);
        let b = a.with_update("on", a.attributes.clone(), Context::new());
        assert_eq!(a, b);
        assert_ne!(a, light("on", 101));
    }

    #[test]
    fn test_attribute_str() {
        let state = State::new(
            "scene.movie_night".parse().unwrap(),
            "scening",
            HashMap::from([("id".to_string(), json!("1700000000"))]),
            Context::new(),
        );
        assert_eq!(state.attribute_str("id"), Some("1700000000"));
        assert_eq!(state.attribute_str("icon"), None);
    }
}

//! Validated description of one scene

use indexmap::IndexMap;
use scenes_core::{domain_of, STATE_OFF, STATE_ON};
use serde_json::Value;

use crate::attributes::is_relevant;

/// Desired state of one member entity
#[derive(Debug, Clone, PartialEq)]
pub struct MemberState {
    pub state: String,

    /// Only attributes relevant to the member's domain
    pub attributes: IndexMap<String, Value>,
}

impl MemberState {
    /// Build from a raw `{state, ...attributes}` entry
    ///
    /// Returns `None` when the entry has no usable `state`. Attributes not
    /// relevant to `entity_id`'s domain and null attributes are dropped.
    pub fn from_raw(entity_id: &str, raw: &IndexMap<String, Value>) -> Option<Self> {
        let state = normalize_state(raw.get("state")?)?;
        let domain = domain_of(entity_id);

        let attributes = raw
            .iter()
            .filter(|(key, value)| {
                key.as_str() != "state" && !value.is_null() && is_relevant(domain, key)
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Some(Self { state, attributes })
    }

    pub fn is_off(&self) -> bool {
        self.state == STATE_OFF
    }
}

/// Desired state as the platform reports it
///
/// Booleans become "on"/"off" and numbers their decimal form. Null, lists
/// and mappings are not states.
fn normalize_state(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(true) => Some(STATE_ON.to_string()),
        Value::Bool(false) => Some(STATE_OFF.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A scene after validation and extraction
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDefinition {
    pub name: String,

    /// Stable identifier from configuration
    pub id: String,

    /// Platform scene entity invoked on activation
    pub activation_target: Option<String>,

    pub icon: Option<String>,

    pub area: Option<String>,

    /// Built by capturing live state rather than declared
    pub learn: bool,

    pub members: IndexMap<String, MemberState>,

    pub number_tolerance: f64,
}

impl SceneDefinition {
    /// Identifier used for anything derived from this scene
    ///
    /// Learned scenes get a `_learned` suffix so they never collide with a
    /// declared scene wrapping the same platform scene.
    pub fn effective_id(&self) -> String {
        if self.learn {
            format!("{}_learned", self.id)
        } else {
            self.id.clone()
        }
    }

    pub fn member_ids(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }

    pub fn member(&self, entity_id: &str) -> Option<&MemberState> {
        self.members.get(entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> IndexMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_prunes_irrelevant_attributes() {
        let member = MemberState::from_raw(
            "light.kitchen",
            &raw(json!({"state": "on", "brightness": 200, "color_temp": 300, "effect": null})),
        )
        .unwrap();

        assert_eq!(member.state, "on");
        let keys: Vec<_> = member.attributes.keys().cloned().collect();
        assert_eq!(keys, vec!["brightness"]);
    }

    #[test]
    fn test_other_domains_keep_state_only() {
        let member = MemberState::from_raw(
            "switch.coffee",
            &raw(json!({"state": "on", "brightness": 200})),
        )
        .unwrap();
        assert!(member.attributes.is_empty());
    }

    #[test]
    fn test_state_normalisation() {
        let on = MemberState::from_raw("switch.fan", &raw(json!({"state": true}))).unwrap();
        assert_eq!(on.state, "on");
        let off = MemberState::from_raw("switch.fan", &raw(json!({"state": false}))).unwrap();
        assert!(off.is_off());
        let number =
            MemberState::from_raw("input_number.level", &raw(json!({"state": 3}))).unwrap();
        assert_eq!(number.state, "3");
    }

    #[test]
    fn test_missing_or_null_state() {
        assert!(MemberState::from_raw("light.a", &raw(json!({"brightness": 1}))).is_none());
        assert!(MemberState::from_raw("light.a", &raw(json!({"state": null}))).is_none());
    }

    #[test]
    fn test_effective_id() {
        let mut definition = SceneDefinition {
            name: "Movie night".to_string(),
            id: "1700000000".to_string(),
            activation_target: None,
            icon: None,
            area: None,
            learn: false,
            members: IndexMap::new(),
            number_tolerance: 1.0,
        };
        assert_eq!(definition.effective_id(), "1700000000");
        definition.learn = true;
        assert_eq!(definition.effective_id(), "1700000000_learned");
    }
}

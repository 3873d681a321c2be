//! Service (action) calls issued to the platform

use crate::Context;
use serde::{Deserialize, Serialize};

/// One call to a platform service such as `scene.turn_on`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    /// Service domain ("scene", "homeassistant", ...)
    pub domain: String,

    /// Service name ("turn_on", "apply", "turn_off", ...)
    pub service: String,

    /// Call payload
    pub service_data: serde_json::Value,

    pub context: Context,
}

impl ServiceCall {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: serde_json::Value,
        context: Context,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data,
            context,
        }
    }

    /// Typed lookup of one payload field
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.service_data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Targeted entity ids, accepting both a single string and a list
    pub fn entity_ids(&self) -> Vec<String> {
        match self.service_data.get("entity_id") {
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            Some(serde_json::Value::Array(arr)) => arr
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => vec![],
        }
    }
}

//! Device Registry

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Area the device is placed in; inherited by its entities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,
}

impl DeviceEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            name: name.into(),
            manufacturer: None,
            model: None,
            area_id: None,
        }
    }
}

#[derive(Default)]
pub struct DeviceRegistry {
    by_id: DashMap<String, Arc<DeviceEntry>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: DeviceEntry) -> Arc<DeviceEntry> {
        let entry = Arc::new(entry);
        debug!(device_id = %entry.id, name = %entry.name, "Registering device");
        self.by_id.insert(entry.id.clone(), Arc::clone(&entry));
        entry
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        self.by_id.get(device_id).map(|r| Arc::clone(r.value()))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

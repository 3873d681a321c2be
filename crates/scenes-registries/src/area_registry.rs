//! Area Registry
//!
//! Tracks the rooms and zones entities and devices are assigned to.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaEntry {
    pub id: String,

    /// Area name (e.g., "Living Room")
    pub name: String,

    /// Area icon (e.g., "mdi:sofa")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl AreaEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            name: name.into(),
            icon: None,
        }
    }
}

/// Lowercased, trimmed, punctuation stripped
fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .trim()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ', "")
}

/// Entries are stored as `Arc<AreaEntry>` to avoid cloning on reads.
#[derive(Default)]
pub struct AreaRegistry {
    by_id: DashMap<String, Arc<AreaEntry>>,
    /// normalized name -> area_id
    by_name: DashMap<String, String>,
}

impl AreaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry
    pub fn insert(&self, entry: AreaEntry) -> Arc<AreaEntry> {
        let entry = Arc::new(entry);
        debug!(area_id = %entry.id, name = %entry.name, "Registering area");
        self.by_name
            .insert(normalize_name(&entry.name), entry.id.clone());
        self.by_id.insert(entry.id.clone(), Arc::clone(&entry));
        entry
    }

    /// Create an area with a generated id
    pub fn create(&self, name: impl Into<String>) -> Arc<AreaEntry> {
        self.insert(AreaEntry::new(name))
    }

    pub fn get(&self, area_id: &str) -> Option<Arc<AreaEntry>> {
        self.by_id.get(area_id).map(|r| Arc::clone(r.value()))
    }

    /// Case and punctuation insensitive lookup by name
    pub fn get_by_name(&self, name: &str) -> Option<Arc<AreaEntry>> {
        let area_id = self.by_name.get(&normalize_name(name))?.clone();
        self.get(&area_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_lookup() {
        let registry = AreaRegistry::new();
        let area = registry.create("Living Room");

        assert_eq!(registry.get(&area.id).unwrap().name, "Living Room");
        assert_eq!(registry.get_by_name("living room!").unwrap().id, area.id);
        assert!(registry.get_by_name("Kitchen").is_none());
        assert_eq!(registry.len(), 1);
    }
}

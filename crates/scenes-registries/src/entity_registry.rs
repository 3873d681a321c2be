//! Entity Registry
//!
//! Registry metadata of entities, indexed by entity_id, unique_id and domain.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Reason an entity was disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledBy {
    ConfigEntry,
    Device,
    Hass,
    Integration,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEntry {
    /// Full entity ID (domain.object_id)
    pub entity_id: String,

    /// Platform-specific unique identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,

    /// Integration that provides this entity
    pub platform: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,

    /// User-set name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Platform default name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,

    /// User-set icon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_by: Option<DisabledBy>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl EntityEntry {
    pub fn new(entity_id: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            unique_id: None,
            platform: platform.into(),
            device_id: None,
            area_id: None,
            name: None,
            original_name: None,
            icon: None,
            disabled_by: None,
            created_at: Utc::now(),
        }
    }

    pub fn domain(&self) -> &str {
        scenes_core::domain_of(&self.entity_id)
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled_by.is_some()
    }

    /// User-set name, else the platform default
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.original_name.as_deref())
    }
}

/// Entries are stored as `Arc<EntityEntry>` to avoid cloning on reads.
#[derive(Default)]
pub struct EntityRegistry {
    /// Primary index: entity_id -> entry
    by_entity_id: DashMap<String, Arc<EntityEntry>>,
    /// unique_id -> entity_id
    by_unique_id: DashMap<String, String>,
    /// domain -> entity_ids
    by_domain: DashMap<String, HashSet<String>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry, keeping the secondary indexes in step
    pub fn insert(&self, entry: EntityEntry) -> Arc<EntityEntry> {
        if let Some((_, previous)) = self.by_entity_id.remove(&entry.entity_id) {
            self.unindex(&previous);
        }

        let entry = Arc::new(entry);
        debug!(entity_id = %entry.entity_id, platform = %entry.platform, "Registering entity");

        if let Some(unique_id) = &entry.unique_id {
            self.by_unique_id
                .insert(unique_id.clone(), entry.entity_id.clone());
        }
        self.by_domain
            .entry(entry.domain().to_string())
            .or_default()
            .insert(entry.entity_id.clone());
        self.by_entity_id
            .insert(entry.entity_id.clone(), Arc::clone(&entry));

        entry
    }

    fn unindex(&self, entry: &EntityEntry) {
        if let Some(unique_id) = &entry.unique_id {
            self.by_unique_id.remove(unique_id);
        }
        if let Some(mut ids) = self.by_domain.get_mut(entry.domain()) {
            ids.remove(&entry.entity_id);
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        self.by_entity_id.get(entity_id).map(|r| Arc::clone(r.value()))
    }

    pub fn get_by_unique_id(&self, unique_id: &str) -> Option<Arc<EntityEntry>> {
        let entity_id = self.by_unique_id.get(unique_id)?.clone();
        self.get(&entity_id)
    }

    /// All entries of `domain`, sorted by entity_id
    pub fn get_by_domain(&self, domain: &str) -> Vec<Arc<EntityEntry>> {
        let mut entries: Vec<_> = self
            .by_domain
            .get(domain)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        entries
    }

    pub fn remove(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        let (_, entry) = self.by_entity_id.remove(entity_id)?;
        self.unindex(&entry);
        debug!(entity_id = %entity_id, "Removed entity");
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.by_entity_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_entity_id.is_empty()
    }
}

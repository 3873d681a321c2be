//! Entity, device and area metadata registries
//!
//! The scene engine only reads from these: display names and icons for
//! scenes built from platform scene entities, and the area an entity lives
//! in. Entries are kept in memory; the binary seeds them from a fixture.

pub mod area_registry;
pub mod device_registry;
pub mod entity_registry;

pub use area_registry::{AreaEntry, AreaRegistry};
pub use device_registry::{DeviceEntry, DeviceRegistry};
pub use entity_registry::{DisabledBy, EntityEntry, EntityRegistry};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// All registries bundled together
#[derive(Default)]
pub struct Registries {
    pub entities: EntityRegistry,
    pub devices: DeviceRegistry,
    pub areas: AreaRegistry,
}

/// Serialized form of all three registries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistriesData {
    #[serde(default)]
    pub areas: Vec<AreaEntry>,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
    #[serde(default)]
    pub entities: Vec<EntityEntry>,
}

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registries pre-populated from `data`
    pub fn from_data(data: RegistriesData) -> Self {
        let registries = Self::new();
        for area in data.areas {
            registries.areas.insert(area);
        }
        for device in data.devices {
            registries.devices.insert(device);
        }
        for entity in data.entities {
            registries.entities.insert(entity);
        }
        registries
    }

    /// Area id of an entity: its own area, else its device's area
    pub fn area_id_for_entity(&self, entity_id: &str) -> Option<String> {
        let entry = self.entities.get(entity_id)?;
        if let Some(area_id) = &entry.area_id {
            return Some(area_id.clone());
        }
        let device_id = entry.device_id.as_deref()?;
        self.devices.get(device_id)?.area_id.clone()
    }

    /// Area name of an entity, resolved like [`Self::area_id_for_entity`]
    pub fn area_name_for_entity(&self, entity_id: &str) -> Option<String> {
        let area_id = self.area_id_for_entity(entity_id)?;
        self.areas.get(&area_id).map(|area| area.name.clone())
    }
}

/// Thread-safe wrapper for Registries
pub type SharedRegistries = Arc<Registries>;

#[cfg(test)]
mod tests {
    use super::*;

    fn registries() -> Registries {
        let registries = Registries::new();
        let living = registries.areas.create("Living Room");
        let bedroom = registries.areas.create("Bedroom");

        let mut hub = DeviceEntry::new("Hue bridge");
        hub.area_id = Some(living.id.clone());
        let hub = registries.devices.insert(hub);

        let mut tv_light = EntityEntry::new("light.tv_backlight", "hue");
        tv_light.device_id = Some(hub.id.clone());
        registries.entities.insert(tv_light);

        let mut lamp = EntityEntry::new("light.bedside", "hue");
        lamp.device_id = Some(hub.id.clone());
        lamp.area_id = Some(bedroom.id.clone());
        registries.entities.insert(lamp);

        registries
    }

    #[test]
    fn test_area_falls_back_to_device() {
        let registries = registries();
        assert_eq!(
            registries.area_name_for_entity("light.tv_backlight").as_deref(),
            Some("Living Room")
        );
    }

    #[test]
    fn test_entity_area_wins_over_device() {
        let registries = registries();
        assert_eq!(
            registries.area_name_for_entity("light.bedside").as_deref(),
            Some("Bedroom")
        );
    }

    #[test]
    fn test_unknown_entity_has_no_area() {
        let registries = registries();
        assert!(registries.area_name_for_entity("light.garage").is_none());
    }

    #[test]
    fn test_from_data() {
        let data: RegistriesData = serde_json::from_value(serde_json::json!({
            "areas": [{"id": "kitchen", "name": "Kitchen"}],
            "entities": [{
                "entity_id": "scene.cooking",
                "platform": "hue",
                "area_id": "kitchen",
                "unique_id": "1700000000"
            }]
        }))
        .unwrap();

        let registries = Registries::from_data(data);
        assert_eq!(
            registries.area_name_for_entity("scene.cooking").as_deref(),
            Some("Kitchen")
        );
        assert_eq!(
            registries
                .entities
                .get("scene.cooking")
                .unwrap()
                .unique_id
                .as_deref(),
            Some("1700000000")
        );
    }
}

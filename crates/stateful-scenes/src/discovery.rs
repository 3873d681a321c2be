//! Finding platform scenes that are not wrapped yet

use scenes_registries::EntityEntry;
use tracing::debug;

use crate::host::MetadataProvider;

/// Platform whose scenes are the user's own YAML scenes
const BUILTIN_PLATFORM: &str = "homeassistant";

/// A platform scene that could be learned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredScene {
    pub entity_id: String,
    pub unique_id: Option<String>,
}

/// Enabled `scene.*` entities provided by an integration
pub fn should_process(entry: &EntityEntry) -> bool {
    !entry.is_disabled() && entry.domain() == "scene" && entry.platform != BUILTIN_PLATFORM
}

/// Scenes eligible for learning that none of `configured` already wraps
pub fn discover_external_scenes(
    metadata: &dyn MetadataProvider,
    configured: &[String],
) -> Vec<DiscoveredScene> {
    debug!("Start discovering external scenes");
    let found: Vec<_> = metadata
        .entities_in_domain("scene")
        .into_iter()
        .filter(|entry| should_process(entry))
        .filter(|entry| {
            let known = configured.contains(&entry.entity_id);
            if known {
                debug!(entity_id = %entry.entity_id, "Already set up, skipping");
            }
            !known
        })
        .map(|entry| DiscoveredScene {
            entity_id: entry.entity_id.clone(),
            unique_id: entry.unique_id.clone(),
        })
        .collect();
    debug!(found = found.len(), "Done discovering external scenes");
    found
}

//! Core value types shared by every stateful-scenes crate
//!
//! The scene engine never owns device state. It reads [`State`] snapshots
//! from a store, receives [`events::StateChangedData`] notifications and
//! issues [`ServiceCall`]s. Those types live here so the collaborator crates
//! and the engine agree on one representation.

mod context;
mod entity_id;
mod event;
mod service_call;
mod state;

pub use context::Context;
pub use entity_id::{domain_of, EntityId, EntityIdError};
pub use event::{Event, EventData, EventType};
pub use service_call::ServiceCall;
pub use state::State;

/// State value reported by an entity that is switched off
pub const STATE_OFF: &str = "off";

/// State value reported by an entity that is switched on
pub const STATE_ON: &str = "on";

/// State value reported while the platform cannot reach an entity
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Event types fired on the bus
pub mod events {
    use super::*;

    /// Fired by the state store for every write
    pub const STATE_CHANGED: &str = "state_changed";

    /// Fired by the service registry for every dispatched call
    pub const CALL_SERVICE: &str = "call_service";

    /// Payload of [`STATE_CHANGED`]
    ///
    /// `old_state` is `None` the first time an entity is written,
    /// `new_state` is `None` when the entity is removed.
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        pub new_state: Option<State>,
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }

    /// Payload of [`CALL_SERVICE`]
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct CallServiceData {
        pub domain: String,
        pub service: String,
        pub service_data: serde_json::Value,
    }

    impl EventData for CallServiceData {
        fn event_type() -> &'static str {
            CALL_SERVICE
        }
    }
}

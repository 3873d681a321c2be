//! Stateful scenes
//!
//! A platform scene is fire-and-forget: it sets a group of devices and
//! forgets about them. A [`Scene`] here wraps one and keeps answering "are
//! the devices still the way the scene left them?" as an on/off state.
//!
//! - [`compare`] decides whether a live value matches a desired one,
//!   allowing a numeric tolerance and nested structures
//! - [`Scene`] tracks its members, re-evaluates after changes (held back by
//!   an [`EvaluationTimer`] while a transition settles) and undoes itself by
//!   restoring, turning off, or switching to another scene
//! - [`Hub`] validates a scene list and owns the resulting scenes
//!
//! Everything platform-specific goes through [`SceneHost`].

pub mod attributes;
mod compare;
pub mod definition;
pub mod discovery;
mod error;
pub mod host;
mod hub;
mod scene;
mod timer;

pub use compare::compare;
pub use definition::{MemberState, SceneDefinition};
pub use discovery::{discover_external_scenes, DiscoveredScene};
pub use error::{SceneError, SceneResult};
pub use host::{
    ActionDispatcher, MetadataProvider, ScheduledCall, SceneHost, Scheduler, StateProvider,
    StateSubscriber, Subscription, TokioScheduler,
};
pub use hub::{off_scene_candidates, Hub};
pub use scene::{find_scene_by_id, MemberMatch, Scene, SceneOptions, UpdateListener};
pub use timer::EvaluationTimer;

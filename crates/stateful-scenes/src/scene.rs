//! A scene that knows whether it is still applied

use futures::future::BoxFuture;
use indexmap::IndexMap;
use scenes_core::events::StateChangedData;
use scenes_core::State;
use scenes_event_bus::StateChangeHandler;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tracing::{debug, info, instrument, trace, warn};

use crate::attributes::relevant_attributes;
use crate::compare::compare;
use crate::definition::SceneDefinition;
use crate::error::{SceneError, SceneResult};
use crate::host::{ScheduledCall, SceneHost, StateProvider, Subscription};
use crate::timer::{sanitize, EvaluationTimer};

/// Called with the aggregate state after every evaluation, activation and
/// deactivation
pub type UpdateListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Outcome of checking one member against the live state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberMatch {
    Matched,
    Mismatched,
    /// Unavailable while unavailable members are ignored
    Ignored,
}

/// Behavior flags a scene starts with
#[derive(Debug, Clone, PartialEq)]
pub struct SceneOptions {
    pub restore_on_deactivate: bool,
    pub transition_time: f64,
    pub debounce_time: f64,
    pub ignore_unavailable: bool,
    pub ignore_attributes: bool,
}

impl Default for SceneOptions {
    fn default() -> Self {
        Self {
            restore_on_deactivate: true,
            transition_time: 0.0,
            debounce_time: 0.0,
            ignore_unavailable: false,
            ignore_attributes: false,
        }
    }
}

struct Settings {
    number_tolerance: f64,
    restore_on_deactivate: bool,
    ignore_unavailable: bool,
    ignore_attributes: bool,
    off_scene: Option<String>,
}

struct Runtime {
    observed: IndexMap<String, MemberMatch>,
    is_on: bool,
    /// Last state seen before the most recent change, per member
    restore_states: IndexMap<String, Option<State>>,
    learned: bool,
}

pub struct Scene {
    definition: SceneDefinition,
    host: SceneHost,
    settings: RwLock<Settings>,
    runtime: Mutex<Runtime>,
    timer: EvaluationTimer,
    subscription: Mutex<Option<Subscription>>,
    initial_evaluation: Mutex<Option<ScheduledCall>>,
    listener: RwLock<Option<UpdateListener>>,
    me: Weak<Scene>,
}

impl Scene {
    /// Build a scene, subscribe to its members and schedule a first
    /// evaluation
    ///
    /// Must be called from within the runtime that drives `host`.
    pub fn new(host: SceneHost, definition: SceneDefinition, options: SceneOptions) -> Arc<Self> {
        let timer = EvaluationTimer::new(
            Arc::clone(&host.scheduler),
            options.transition_time,
            options.debounce_time,
        );

        let runtime = Runtime {
            observed: definition
                .members
                .keys()
                .map(|id| (id.clone(), MemberMatch::Mismatched))
                .collect(),
            is_on: false,
            restore_states: definition
                .members
                .keys()
                .map(|id| (id.clone(), None))
                .collect(),
            learned: !definition.learn,
        };

        let settings = Settings {
            number_tolerance: sanitize(definition.number_tolerance),
            restore_on_deactivate: options.restore_on_deactivate,
            ignore_unavailable: options.ignore_unavailable,
            ignore_attributes: options.ignore_attributes,
            off_scene: None,
        };

        let scene = Arc::new_cyclic(|me| Self {
            definition,
            host,
            settings: RwLock::new(settings),
            runtime: Mutex::new(runtime),
            timer,
            subscription: Mutex::new(None),
            initial_evaluation: Mutex::new(None),
            listener: RwLock::new(None),
            me: me.clone(),
        });

        scene.register();
        scene
    }

    fn register(&self) {
        let me = self.me.clone();
        let handler: StateChangeHandler = Arc::new(move |data: StateChangedData| {
            let me = me.clone();
            Box::pin(async move {
                if let Some(scene) = me.upgrade() {
                    scene.handle_state_change(
                        &data.entity_id.to_string(),
                        data.old_state,
                        data.new_state,
                    );
                }
            }) as BoxFuture<'static, ()>
        });

        let subscription = self
            .host
            .subscriber
            .track_state_change(self.definition.member_ids(), handler);
        if let Ok(mut slot) = self.subscription.lock() {
            *slot = Some(subscription);
        }

        let me = self.me.clone();
        let first = self.host.scheduler.call_later(
            Duration::ZERO,
            Box::pin(async move {
                if let Some(scene) = me.upgrade() {
                    scene.evaluate_all();
                }
            }),
        );
        if let Ok(mut slot) = self.initial_evaluation.lock() {
            *slot = Some(first);
        }
    }

    pub fn definition(&self) -> &SceneDefinition {
        &self.definition
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn id(&self) -> String {
        self.definition.effective_id()
    }

    /// Platform scene this scene activates, resolved by id if not configured
    pub fn activation_target(&self) -> Option<String> {
        self.definition
            .activation_target
            .clone()
            .or_else(|| find_scene_by_id(self.host.states.as_ref(), &self.definition.id))
    }

    pub fn is_on(&self) -> bool {
        self.runtime.lock().map(|r| r.is_on).unwrap_or(false)
    }

    /// False for a learned scene until it has been activated once
    pub fn learned(&self) -> bool {
        self.runtime.lock().map(|r| r.learned).unwrap_or(false)
    }

    /// Last per-member results
    pub fn member_matches(&self) -> IndexMap<String, MemberMatch> {
        self.runtime
            .lock()
            .map(|r| r.observed.clone())
            .unwrap_or_default()
    }

    /// Register the owner's callback, replacing any previous one
    pub fn set_update_listener(&self, listener: UpdateListener) {
        if let Ok(mut slot) = self.listener.write() {
            *slot = Some(listener);
        }
    }

    fn notify(&self, is_on: bool) {
        let listener = self.listener.read().ok().and_then(|l| l.clone());
        if let Some(listener) = listener {
            listener(is_on);
        }
    }

    fn set_is_on(&self, is_on: bool) {
        if let Ok(mut runtime) = self.runtime.lock() {
            runtime.is_on = is_on;
        }
        self.notify(is_on);
    }

    /// Display attributes of the scene
    pub fn attributes(&self) -> Value {
        json!({
            "friendly_name": self.definition.name,
            "icon": self.definition.icon,
            "area_id": self.definition.area,
            "entity_id": self.definition.member_ids(),
        })
    }

    // Behavior flags. Each takes effect from the next evaluation or action.

    pub fn number_tolerance(&self) -> f64 {
        self.settings.read().map(|s| s.number_tolerance).unwrap_or(0.0)
    }

    pub fn set_number_tolerance(&self, tolerance: f64) {
        if let Ok(mut settings) = self.settings.write() {
            settings.number_tolerance = sanitize(tolerance);
        }
    }

    pub fn transition_time(&self) -> f64 {
        self.timer.transition_time()
    }

    pub fn set_transition_time(&self, seconds: f64) {
        self.timer.set_transition_time(seconds);
    }

    pub fn debounce_time(&self) -> f64 {
        self.timer.debounce_time()
    }

    pub fn set_debounce_time(&self, seconds: f64) {
        self.timer.set_debounce_time(seconds);
    }

    pub fn restore_on_deactivate(&self) -> bool {
        self.settings
            .read()
            .map(|s| s.restore_on_deactivate)
            .unwrap_or(false)
    }

    /// Turning restore on drops any off scene; the two are exclusive
    pub fn set_restore_on_deactivate(&self, restore: bool) {
        if let Ok(mut settings) = self.settings.write() {
            settings.restore_on_deactivate = restore;
            if restore {
                settings.off_scene = None;
            }
        }
    }

    pub fn ignore_unavailable(&self) -> bool {
        self.settings
            .read()
            .map(|s| s.ignore_unavailable)
            .unwrap_or(false)
    }

    pub fn set_ignore_unavailable(&self, ignore: bool) {
        if let Ok(mut settings) = self.settings.write() {
            settings.ignore_unavailable = ignore;
        }
    }

    pub fn ignore_attributes(&self) -> bool {
        self.settings
            .read()
            .map(|s| s.ignore_attributes)
            .unwrap_or(false)
    }

    pub fn set_ignore_attributes(&self, ignore: bool) {
        if let Ok(mut settings) = self.settings.write() {
            settings.ignore_attributes = ignore;
        }
    }

    pub fn off_scene(&self) -> Option<String> {
        self.settings.read().ok().and_then(|s| s.off_scene.clone())
    }

    /// Scene activated on deactivation instead of restoring or turning off
    pub fn set_off_scene(&self, target: Option<String>) {
        if let Ok(mut settings) = self.settings.write() {
            if target.is_some() {
                settings.restore_on_deactivate = false;
            }
            settings.off_scene = target;
        }
    }

    /// Apply the scene
    ///
    /// Member states are captured before the platform is asked to apply
    /// anything, so the notifications the activation causes cannot
    /// overwrite them.
    #[instrument(skip(self), fields(scene = %self.definition.name))]
    pub async fn activate(&self) -> SceneResult<()> {
        let target = self
            .activation_target()
            .ok_or_else(|| SceneError::TargetUnresolved {
                scene: self.definition.name.clone(),
            })?;

        self.capture_member_states();
        self.arm_timer();

        info!(target = %target, "Activating scene");
        self.host
            .actions
            .call_action(
                "scene",
                "turn_on",
                json!({"entity_id": target, "transition": self.transition_time()}),
            )
            .await?;

        if let Ok(mut runtime) = self.runtime.lock() {
            runtime.learned = true;
        }
        self.set_is_on(true);
        Ok(())
    }

    /// Undo the scene: hand off to the off scene, restore, or turn off
    #[instrument(skip(self), fields(scene = %self.definition.name))]
    pub async fn deactivate(&self) -> SceneResult<()> {
        if !self.is_on() {
            trace!("Already off");
            return Ok(());
        }

        let (off_scene, restore) = self
            .settings
            .read()
            .map(|s| (s.off_scene.clone(), s.restore_on_deactivate))
            .unwrap_or((None, false));
        let transition = self.transition_time();

        if let Some(off_scene) = off_scene {
            self.timer.cancel_if_active();
            info!(off_scene = %off_scene, "Switching to off scene");
            self.host
                .actions
                .call_action(
                    "scene",
                    "turn_on",
                    json!({"entity_id": off_scene, "transition": transition}),
                )
                .await?;
        } else if restore {
            self.arm_timer();
            let entities = self.restore_payload();
            info!(entities = entities.len(), "Restoring captured states");
            self.host
                .actions
                .call_action(
                    "scene",
                    "apply",
                    json!({"entities": entities, "transition": transition}),
                )
                .await?;
        } else {
            info!("Turning off members");
            self.host
                .actions
                .call_action(
                    "homeassistant",
                    "turn_off",
                    json!({"entity_id": self.definition.member_ids()}),
                )
                .await?;
        }

        self.set_is_on(false);
        Ok(())
    }

    /// Handle one state change of a member
    pub fn handle_state_change(&self, entity_id: &str, old: Option<State>, new: Option<State>) {
        if !self.definition.members.contains_key(entity_id) {
            return;
        }

        self.store_entity_state(entity_id, old.clone());

        if !self.is_interesting(old.as_ref(), new.as_ref()) {
            trace!(scene = %self.definition.name, entity_id = %entity_id, "Ignoring uninteresting change");
            return;
        }

        // Inside a settle window only the last change counts; otherwise the
        // change was made outside any activation and is evaluated now
        if !self.restart_timer_if_armed() {
            self.evaluate_all();
        }
    }

    fn store_entity_state(&self, entity_id: &str, state: Option<State>) {
        if let Ok(mut runtime) = self.runtime.lock() {
            runtime.restore_states.insert(entity_id.to_string(), state);
        }
    }

    fn capture_member_states(&self) {
        let captured: Vec<_> = self
            .definition
            .members
            .keys()
            .map(|id| (id.clone(), self.host.states.get(id)))
            .collect();
        if let Ok(mut runtime) = self.runtime.lock() {
            runtime.restore_states.extend(captured);
        }
    }

    /// Arm the evaluation timer; false if the window is zero
    fn arm_timer(&self) -> bool {
        let me = self.me.clone();
        self.timer.start(Box::pin(async move {
            if let Some(scene) = me.upgrade() {
                scene.evaluate_all();
            }
        }))
    }

    /// Restart a pending evaluation timer; false if it was idle
    fn restart_timer_if_armed(&self) -> bool {
        let me = self.me.clone();
        self.timer.restart_if_active(Box::pin(async move {
            if let Some(scene) = me.upgrade() {
                scene.evaluate_all();
            }
        }))
    }

    fn is_interesting(&self, old: Option<&State>, new: Option<&State>) -> bool {
        let (Some(old), Some(new)) = (old, new) else {
            return true;
        };
        let tolerance = self.number_tolerance();

        if !compare(
            &Value::String(old.state.clone()),
            &Value::String(new.state.clone()),
            tolerance,
        ) {
            return true;
        }

        relevant_attributes(new.domain()).iter().any(|attribute| {
            match (old.attributes.get(*attribute), new.attributes.get(*attribute)) {
                (Some(before), Some(after)) => !compare(before, after, tolerance),
                _ => false,
            }
        })
    }

    /// `{entity_id: {state, ...relevant attributes}}` from captured states
    fn restore_payload(&self) -> Map<String, Value> {
        let captured = self
            .runtime
            .lock()
            .map(|r| r.restore_states.clone())
            .unwrap_or_default();

        captured
            .into_iter()
            .filter_map(|(entity_id, state)| state.map(|s| (entity_id, s)))
            .map(|(entity_id, state)| {
                let mut entry = Map::new();
                entry.insert("state".to_string(), Value::String(state.state.clone()));
                if !state.is_off() {
                    for attribute in relevant_attributes(state.domain()) {
                        if let Some(value) = state.attributes.get(*attribute) {
                            entry.insert(attribute.to_string(), value.clone());
                        }
                    }
                }
                (entity_id, Value::Object(entry))
            })
            .collect()
    }

    /// Compare one member with its live state
    ///
    /// A member with no live state is looked up once more before it counts
    /// as a mismatch.
    pub fn check_state(&self, entity_id: &str, live: Option<State>) -> MemberMatch {
        let Some(desired) = self.definition.member(entity_id) else {
            return MemberMatch::Mismatched;
        };

        let Some(live) = live.or_else(|| self.host.states.get(entity_id)) else {
            warn!(scene = %self.definition.name, entity_id = %entity_id, "Entity not found");
            return MemberMatch::Mismatched;
        };

        let (tolerance, ignore_unavailable, ignore_attributes) = self
            .settings
            .read()
            .map(|s| (s.number_tolerance, s.ignore_unavailable, s.ignore_attributes))
            .unwrap_or((0.0, false, false));

        if ignore_unavailable && live.is_unavailable() {
            return MemberMatch::Ignored;
        }

        if !compare(
            &Value::String(desired.state.clone()),
            &Value::String(live.state.clone()),
            tolerance,
        ) {
            debug!(
                scene = %self.definition.name,
                entity_id = %entity_id,
                wanted = %desired.state,
                got = %live.state,
                "State not matching"
            );
            return MemberMatch::Mismatched;
        }

        // Attributes of an off device are stale
        if desired.is_off() && live.is_off() {
            return MemberMatch::Matched;
        }

        if ignore_attributes {
            return MemberMatch::Matched;
        }

        for attribute in relevant_attributes(live.domain()) {
            let (Some(wanted), Some(got)) = (
                desired.attributes.get(*attribute),
                live.attributes.get(*attribute),
            ) else {
                continue;
            };
            if !compare(wanted, got, tolerance) {
                debug!(
                    scene = %self.definition.name,
                    entity_id = %entity_id,
                    attribute = %attribute,
                    wanted = %wanted,
                    got = %got,
                    "Attribute not matching"
                );
                return MemberMatch::Mismatched;
            }
        }

        MemberMatch::Matched
    }

    /// Check every member and recompute the aggregate state
    pub fn evaluate_all(&self) -> bool {
        let results: IndexMap<String, MemberMatch> = self
            .definition
            .members
            .keys()
            .map(|id| (id.clone(), self.check_state(id, self.host.states.get(id))))
            .collect();

        let is_on = aggregate(results.values().copied());
        debug!(scene = %self.definition.name, is_on, "Evaluated scene");

        if let Ok(mut runtime) = self.runtime.lock() {
            runtime.observed = results;
            runtime.is_on = is_on;
        }
        self.notify(is_on);
        is_on
    }

    /// Capture `{state, ...attributes}` of each entity from live state
    pub fn learn_scene_states(
        states: &dyn StateProvider,
        entity_ids: &[String],
    ) -> IndexMap<String, IndexMap<String, Value>> {
        entity_ids
            .iter()
            .filter_map(|entity_id| {
                let Some(state) = states.get(entity_id) else {
                    warn!(entity_id = %entity_id, "Cannot learn state of unknown entity");
                    return None;
                };
                let mut captured = IndexMap::new();
                captured.insert("state".to_string(), Value::String(state.state.clone()));
                let mut attributes: Vec<_> = state.attributes.into_iter().collect();
                attributes.sort_by(|a, b| a.0.cmp(&b.0));
                captured.extend(attributes);
                Some((entity_id.clone(), captured))
            })
            .collect()
    }

    /// Stop listening and drop anything pending
    pub fn shutdown(&self) {
        if let Some(subscription) = self.subscription.lock().ok().and_then(|mut s| s.take()) {
            subscription.unsubscribe();
        }
        if let Some(first) = self.initial_evaluation.lock().ok().and_then(|mut s| s.take()) {
            first.cancel();
        }
        self.timer.cancel_if_active();
        debug!(scene = %self.definition.name, "Scene shut down");
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        self.timer.cancel_if_active();
    }
}

/// On iff at least one member matched and none mismatched
fn aggregate(results: impl IntoIterator<Item = MemberMatch>) -> bool {
    let mut any_matched = false;
    for result in results {
        match result {
            MemberMatch::Mismatched => return false,
            MemberMatch::Matched => any_matched = true,
            MemberMatch::Ignored => {}
        }
    }
    any_matched
}

/// Platform scene whose `id` attribute is `id`
pub fn find_scene_by_id(states: &dyn StateProvider, id: &str) -> Option<String> {
    states
        .find_by_attribute("scene", "id", &Value::String(id.to_string()))
        .map(|state| state.entity_id.to_string())
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("name", &self.definition.name)
            .field("id", &self.definition.effective_id())
            .field("is_on", &self.is_on())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate() {
        use MemberMatch::*;
        assert!(aggregate([Matched, Matched]));
        assert!(aggregate([Matched, Ignored]));
        assert!(!aggregate([Matched, Mismatched]));
        assert!(!aggregate([Ignored, Ignored]));
        assert!(!aggregate(Vec::new()));
    }
}

//! What a scene needs from the platform it runs on
//!
//! Scenes never reach for global state. Everything they read or do goes
//! through the traits below, bundled in a cloneable [`SceneHost`]. The
//! workspace crates implement them, and tests can substitute their own.

use async_trait::async_trait;
use futures::future::BoxFuture;
use scenes_core::{Context, State};
use scenes_event_bus::{EventBus, StateChangeHandler};
use scenes_registries::{EntityEntry, Registries};
use scenes_service_registry::{ServiceError, ServiceRegistry};
use scenes_state_store::StateStore;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::trace;

/// Read access to live entity state
pub trait StateProvider: Send + Sync {
    fn get(&self, entity_id: &str) -> Option<State>;

    fn domain_states(&self, domain: &str) -> Vec<State>;

    /// First state in `domain` whose attribute `key` equals `value`
    fn find_by_attribute(
        &self,
        domain: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Option<State> {
        self.domain_states(domain)
            .into_iter()
            .find(|state| state.attributes.get(key) == Some(value))
    }
}

/// Issues platform actions such as `scene.turn_on`
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn call_action(
        &self,
        domain: &str,
        service: &str,
        data: serde_json::Value,
    ) -> Result<(), ServiceError>;
}

/// Registry metadata for entities
pub trait MetadataProvider: Send + Sync {
    fn entity(&self, entity_id: &str) -> Option<Arc<EntityEntry>>;

    /// Name of the entity's area, falling back to its device's area
    fn area_name(&self, entity_id: &str) -> Option<String>;

    fn entities_in_domain(&self, domain: &str) -> Vec<Arc<EntityEntry>>;
}

/// Delivers state changes of a fixed set of entities
pub trait StateSubscriber: Send + Sync {
    fn track_state_change(
        &self,
        entity_ids: Vec<String>,
        handler: StateChangeHandler,
    ) -> Subscription;
}

/// Runs a future after a delay
pub trait Scheduler: Send + Sync {
    fn call_later(&self, delay: Duration, task: BoxFuture<'static, ()>) -> ScheduledCall;
}

/// Live state-change registration; released on drop
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

/// Handle for a pending [`Scheduler::call_later`]
///
/// Dropping the handle does not cancel the call.
pub struct ScheduledCall {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ScheduledCall {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// Cancel the call; later calls are no-ops
    pub fn cancel(&self) {
        let cancel = self.cancel.lock().ok().and_then(|mut slot| slot.take());
        if let Some(cancel) = cancel {
            cancel();
        }
    }
}

impl std::fmt::Debug for ScheduledCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledCall").finish_non_exhaustive()
    }
}

/// [`Scheduler`] backed by `tokio::time::sleep`
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn call_later(&self, delay: Duration, task: BoxFuture<'static, ()>) -> ScheduledCall {
        trace!(delay_ms = delay.as_millis() as u64, "Scheduling delayed call");
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        ScheduledCall::new(move || handle.abort())
    }
}

/// Everything a scene talks to
#[derive(Clone)]
pub struct SceneHost {
    pub states: Arc<dyn StateProvider>,
    pub actions: Arc<dyn ActionDispatcher>,
    pub metadata: Arc<dyn MetadataProvider>,
    pub subscriber: Arc<dyn StateSubscriber>,
    pub scheduler: Arc<dyn Scheduler>,
}

impl SceneHost {
    /// Host backed by the workspace's bus, store, services and registries
    pub fn new(
        bus: Arc<EventBus>,
        states: Arc<StateStore>,
        services: Arc<ServiceRegistry>,
        registries: Arc<Registries>,
    ) -> Self {
        Self {
            states,
            actions: services,
            metadata: registries,
            subscriber: bus,
            scheduler: Arc::new(TokioScheduler),
        }
    }
}

impl StateProvider for StateStore {
    fn get(&self, entity_id: &str) -> Option<State> {
        StateStore::get(self, entity_id)
    }

    fn domain_states(&self, domain: &str) -> Vec<State> {
        StateStore::domain_states(self, domain)
    }

    fn find_by_attribute(
        &self,
        domain: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Option<State> {
        StateStore::find_by_attribute(self, domain, key, value)
    }
}

#[async_trait]
impl ActionDispatcher for ServiceRegistry {
    async fn call_action(
        &self,
        domain: &str,
        service: &str,
        data: serde_json::Value,
    ) -> Result<(), ServiceError> {
        self.call(domain, service, data, Context::new()).await?;
        Ok(())
    }
}

impl MetadataProvider for Registries {
    fn entity(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        self.entities.get(entity_id)
    }

    fn area_name(&self, entity_id: &str) -> Option<String> {
        self.area_name_for_entity(entity_id)
    }

    fn entities_in_domain(&self, domain: &str) -> Vec<Arc<EntityEntry>> {
        self.entities.get_by_domain(domain)
    }
}

impl StateSubscriber for EventBus {
    fn track_state_change(
        &self,
        entity_ids: Vec<String>,
        handler: StateChangeHandler,
    ) -> Subscription {
        let subscription = EventBus::track_state_change(self, entity_ids, handler);
        Subscription::new(move || subscription.unsubscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_runs_after_delay() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        let _call = TokioScheduler.call_later(
            Duration::from_secs(2),
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(1999)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        let call = TokioScheduler.call_later(
            Duration::from_secs(1),
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        call.cancel();
        call.cancel();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscription_released_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let subscription = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        subscription.unsubscribe();
        assert_eq!(released.load(Ordering::SeqCst), 1);

        let counter = released.clone();
        drop(Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }
}

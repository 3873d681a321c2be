//! Event bus with typed pub/sub
//!
//! Besides plain subscriptions, the bus offers [`EventBus::track_state_change`]
//! which delivers `state_changed` events for a fixed set of entities to an
//! async handler, one at a time, in the order they were fired.

use dashmap::DashMap;
use futures::future::BoxFuture;
use scenes_core::events::StateChangedData;
use scenes_core::{Context, Event, EventData, EventType};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Default channel capacity for event subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Async callback invoked for each tracked state change
pub type StateChangeHandler = Arc<dyn Fn(StateChangedData) -> BoxFuture<'static, ()> + Send + Sync>;

/// The event bus for publishing and subscribing to events
pub struct EventBus {
    /// Map of event types to their broadcast senders
    listeners: DashMap<EventType, broadcast::Sender<Event>>,
    /// Sender for `*` subscribers
    match_all_sender: broadcast::Sender<Event>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (match_all_sender, _) = broadcast::channel(capacity);
        Self {
            listeners: DashMap::new(),
            match_all_sender,
            capacity,
        }
    }

    /// Subscribe to events of a specific type
    pub fn subscribe(&self, event_type: impl Into<EventType>) -> broadcast::Receiver<Event> {
        let event_type = event_type.into();
        trace!(event_type = %event_type, "Subscribing to event type");

        if event_type.is_match_all() {
            return self.match_all_sender.subscribe();
        }

        self.listeners
            .entry(event_type)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Subscribe to a typed event; payloads that fail to parse are skipped
    pub fn subscribe_typed<T: EventData + serde::de::DeserializeOwned>(
        &self,
    ) -> TypedEventReceiver<T> {
        TypedEventReceiver::new(self.subscribe(T::event_type()))
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.match_all_sender.subscribe()
    }

    /// Fire an event to the subscribers of its type and to `*` subscribers
    pub fn fire(&self, event: Event) {
        debug!(event_type = %event.event_type, "Firing event");

        if let Some(sender) = self.listeners.get(&event.event_type) {
            // No active receivers is not an error
            let _ = sender.send(event.clone());
        }

        let _ = self.match_all_sender.send(event);
    }

    pub fn fire_typed<T: EventData + serde::Serialize>(&self, data: T, context: Context) {
        let event = Event::typed(data, context)
            .map(|data| serde_json::to_value(&data).unwrap_or_default());
        self.fire(event);
    }

    /// Deliver `state_changed` events for `entity_ids` to `handler`
    ///
    /// The bus subscription is taken before this returns, so any change fired
    /// afterwards is seen. Each handler future is awaited before the next
    /// event is taken. Dropping the returned handle stops delivery.
    pub fn track_state_change(
        &self,
        entity_ids: impl IntoIterator<Item = String>,
        handler: StateChangeHandler,
    ) -> StateChangeSubscription {
        let tracked: HashSet<String> = entity_ids.into_iter().collect();
        let mut rx = self.subscribe_typed::<StateChangedData>();
        debug!(entities = tracked.len(), "Tracking state changes");

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if tracked.contains(&event.data.entity_id.to_string()) {
                            handler(event.data).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "State change tracker lagged behind the bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        StateChangeSubscription { task }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for a [`EventBus::track_state_change`] registration
#[derive(Debug)]
pub struct StateChangeSubscription {
    task: JoinHandle<()>,
}

impl StateChangeSubscription {
    /// Stop delivering events; safe to call more than once
    pub fn unsubscribe(&self) {
        self.task.abort();
    }
}

impl Drop for StateChangeSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A receiver for typed events
pub struct TypedEventReceiver<T> {
    rx: broadcast::Receiver<Event>,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: EventData + serde::de::DeserializeOwned> TypedEventReceiver<T> {
    fn new(rx: broadcast::Receiver<Event>) -> Self {
        Self {
            rx,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Receive the next event whose payload parses as `T`
    pub async fn recv(&mut self) -> Result<Event<T>, broadcast::error::RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if let Ok(data) = serde_json::from_value::<T>(event.data.clone()) {
                return Ok(event.map(|_| data));
            }
        }
    }
}

pub type SharedEventBus = Arc<EventBus>;

#[cfg(test)]
mod tests {
    use super::*;
    use scenes_core::{EntityId, State};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_test::assert_ok;

    fn state_changed(entity: &str, value: &str) -> StateChangedData {
        let entity_id: EntityId = entity.parse().unwrap();
        StateChangedData {
            entity_id: entity_id.clone(),
            old_state: None,
            new_state: Some(State::new(entity_id, value, HashMap::new(), Context::new())),
        }
    }

    fn recording_handler() -> (StateChangeHandler, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: StateChangeHandler = Arc::new(move |data: StateChangedData| {
            let sink = sink.clone();
            Box::pin(async move {
                let value = data.new_state.map(|s| s.state).unwrap_or_default();
                sink.lock()
                    .unwrap()
                    .push(format!("{}={}", data.entity_id, value));
            }) as BoxFuture<'static, ()>
        });
        (handler, seen)
    }

    #[tokio::test]
    async fn test_subscribe_and_fire() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe("test_event");

        bus.fire(Event::new("test_event", json!({"key": "value"}), Context::new()));

        let received = assert_ok!(rx.recv().await);
        assert_eq!(received.event_type.as_str(), "test_event");
        assert_eq!(received.data["key"], "value");
    }

    #[tokio::test]
    async fn test_match_all_subscription() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_all();

        bus.fire(Event::new("event_a", json!({}), Context::new()));
        bus.fire(Event::new("event_b", json!({}), Context::new()));

        assert_eq!(rx.recv().await.unwrap().event_type.as_str(), "event_a");
        assert_eq!(rx.recv().await.unwrap().event_type.as_str(), "event_b");
    }

    #[tokio::test]
    async fn test_typed_subscription() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_typed::<StateChangedData>();

        bus.fire_typed(state_changed("light.test", "on"), Context::new());

        let received = assert_ok!(rx.recv().await);
        assert_eq!(received.data.entity_id.to_string(), "light.test");
        assert!(received.data.new_state.is_some());
    }

    #[tokio::test]
    async fn test_no_cross_event_pollution() {
        let bus = EventBus::new();
        let mut rx_a = bus.subscribe("event_a");
        let mut rx_b = bus.subscribe("event_b");

        bus.fire(Event::new("event_a", json!({"type": "a"}), Context::new()));

        assert_eq!(rx_a.recv().await.unwrap().data["type"], "a");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_state_change_filters_and_orders() {
        let bus = EventBus::new();
        let (handler, seen) = recording_handler();
        let _sub = bus.track_state_change(
            vec!["light.kitchen".to_string(), "fan.ceiling".to_string()],
            handler,
        );

        bus.fire_typed(state_changed("light.kitchen", "on"), Context::new());
        bus.fire_typed(state_changed("light.hallway", "on"), Context::new());
        bus.fire_typed(state_changed("fan.ceiling", "off"), Context::new());
        bus.fire_typed(state_changed("light.kitchen", "off"), Context::new());

        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["light.kitchen=on", "fan.ceiling=off", "light.kitchen=off"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let (handler, seen) = recording_handler();
        let sub = bus.track_state_change(vec!["light.kitchen".to_string()], handler);

        sub.unsubscribe();
        sub.unsubscribe();
        tokio::time::sleep(Duration::from_millis(10)).await;

        bus.fire_typed(state_changed("light.kitchen", "on"), Context::new());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(seen.lock().unwrap().is_empty());
    }
}

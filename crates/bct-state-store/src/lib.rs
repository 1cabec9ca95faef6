//! Current entity states
//!
//! Holds the latest state of every entity on the host: the physical inputs
//! (switches, buttons, sensors) and the tracker's own sensors. Every write
//! fires `state_changed` on the event bus, which is how triggers reach the
//! tracker.

use std::collections::HashMap;
use std::sync::Arc;

use bct_core::events::StateChangedData;
use bct_core::{Context, EntityId, State};
use bct_event_bus::EventBus;
use dashmap::DashMap;
use tracing::{debug, instrument, trace};

pub struct StateStore {
    states: DashMap<String, State>,
    event_bus: Arc<EventBus>,
}

impl StateStore {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            states: DashMap::new(),
            event_bus,
        }
    }

    /// Write an entity state and fire `state_changed`
    ///
    /// The event fires on every write, even when the value is unchanged, so
    /// that button entities (whose state is a press timestamp) and repeated
    /// switch writes are both visible to listeners.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> State {
        let key = entity_id.to_string();
        let old_state = self.states.get(&key).map(|s| s.clone());

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes, context.clone()),
            None => State::new(entity_id.clone(), state, attributes, context.clone()),
        };

        debug!(
            state = %new_state.state,
            changed = old_state.as_ref().map_or(true, |s| s.state != new_state.state),
            "Setting entity state"
        );

        self.states.insert(key, new_state.clone());

        self.event_bus.fire_typed(
            StateChangedData {
                entity_id,
                old_state,
                new_state: Some(new_state.clone()),
            },
            context,
        );

        new_state
    }

    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    /// Remove an entity and fire `state_changed` with no new state
    #[instrument(skip(self, context), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId, context: Context) -> Option<State> {
        let key = entity_id.to_string();
        let old_state = self.states.remove(&key).map(|(_, s)| s);

        if let Some(ref state) = old_state {
            trace!("Removing entity state");

            self.event_bus.fire_typed(
                StateChangedData {
                    entity_id: entity_id.clone(),
                    old_state: Some(state.clone()),
                    new_state: None,
                },
                context,
            );
        }

        old_state
    }
}

pub type SharedStateStore = Arc<StateStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use bct_core::events::STATE_CHANGED;
    use serde_json::json;

    fn setup() -> (Arc<EventBus>, StateStore) {
        let bus = Arc::new(EventBus::new());
        let store = StateStore::new(bus.clone());
        (bus, store)
    }

    fn id(s: &str) -> EntityId {
        s.parse().unwrap()
    }

    #[test]
    fn test_set_and_get() {
        let (_, store) = setup();
        let attrs = HashMap::from([("side".to_string(), json!("left"))]);

        let state = store.set(
            id("binary_sensor.emma_feeding"),
            "on",
            attrs.clone(),
            Context::new(),
        );
        assert_eq!(state.state, "on");
        assert_eq!(state.attributes, attrs);
        assert_eq!(
            store.get_state("binary_sensor.emma_feeding").as_deref(),
            Some("on")
        );
        assert!(store.get_state("binary_sensor.emma_sleeping").is_none());
    }

    #[test]
    fn test_remove() {
        let (_, store) = setup();
        let crib = id("switch.crib");
        store.set(crib.clone(), "on", HashMap::new(), Context::new());

        let removed = store.remove(&crib, Context::new()).unwrap();
        assert_eq!(removed.state, "on");
        assert!(store.get("switch.crib").is_none());
        assert!(store.remove(&crib, Context::new()).is_none());
    }

    #[tokio::test]
    async fn test_every_write_fires_state_changed() {
        let (bus, store) = setup();
        let mut rx = bus.subscribe(STATE_CHANGED);

        store.set(id("switch.crib"), "on", HashMap::new(), Context::new());
        store.set(id("switch.crib"), "on", HashMap::new(), Context::new());

        let first: StateChangedData = serde_json::from_value(rx.recv().await.unwrap().data).unwrap();
        assert!(first.old_state.is_none());

        let second: StateChangedData =
            serde_json::from_value(rx.recv().await.unwrap().data).unwrap();
        assert_eq!(second.old_state.unwrap().state, "on");
        assert_eq!(second.new_state.unwrap().state, "on");
    }
}

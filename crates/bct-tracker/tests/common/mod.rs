//! Shared harness for the tracker integration tests
//!
//! A [`TestHost`] is a full host on a temporary config directory with a
//! hand-driven clock.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bct_core::{Context, EntityId, Event};
use bct_service_registry::ServiceResult;
use bct_tracker::consts::DOMAIN;
use bct_tracker::{BabyCareTracker, BabyCoordinator, Hass, MockClock};
use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde_json::{json, Value};
use tempfile::TempDir;

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap()
}

pub fn default_start() -> NaiveDateTime {
    at(2025, 8, 1, 10, 0)
}

pub struct TestHost {
    pub dir: TempDir,
    pub hass: Arc<Hass>,
    pub clock: MockClock,
    pub tracker: Arc<BabyCareTracker>,
}

impl TestHost {
    pub fn new() -> Self {
        Self::open(TempDir::new().unwrap(), MockClock::at(default_start()))
    }

    fn open(dir: TempDir, clock: MockClock) -> Self {
        let hass = Arc::new(Hass::new(dir.path()));
        let tracker = BabyCareTracker::new(hass.clone(), Arc::new(clock.clone()));
        Self {
            dir,
            hass,
            clock,
            tracker,
        }
    }

    /// Unload everything and start a fresh host on the same directory
    pub async fn restart(self) -> Self {
        self.tracker.unload_all().await;
        self.hass.save_registries().await.unwrap();

        let restarted = Self::open(self.dir, self.clock);
        restarted.hass.load_registries().await.unwrap();
        restarted.tracker.setup_all().await;
        restarted
    }

    /// Create and set up a baby with the given mapping options
    pub async fn add_baby(&self, name: &str, mappings: &[(&str, &str)]) -> String {
        let entry = self.tracker.create_entry(name, None).await.unwrap();
        if !mappings.is_empty() {
            let options: IndexMap<String, Value> = mappings
                .iter()
                .map(|(k, v)| (k.to_string(), json!(v)))
                .collect();
            self.hass
                .registries
                .config_entries
                .update_options(&entry.entry_id, options)
                .await
                .unwrap();
        }
        self.tracker.setup_entry(&entry.entry_id).await.unwrap();
        entry.entry_id
    }

    pub fn coordinator(&self) -> Arc<BabyCoordinator> {
        self.tracker.resolve(None).unwrap()
    }

    pub fn set_state(&self, entity_id: &str, state: &str) {
        let entity_id: EntityId = entity_id.parse().expect("Invalid entity_id");
        self.hass
            .states
            .set(entity_id, state, HashMap::new(), Context::new());
    }

    pub fn state(&self, entity_id: &str) -> Option<String> {
        self.hass.states.get_state(entity_id)
    }

    pub fn assert_state(&self, entity_id: &str, expected: &str) {
        let state = self.state(entity_id);
        assert_eq!(
            state.as_deref(),
            Some(expected),
            "Expected entity {} to be in state '{}', but was {:?}",
            entity_id,
            expected,
            state
        );
    }

    /// Register an entity that belongs to a remote device
    pub fn register_remote(&self, entity_id: &str, device_id: &str) {
        self.hass.registries.entities.get_or_create(
            "zha",
            entity_id,
            Some(&format!("{}-{}", device_id, entity_id)),
            None,
            Some(device_id),
        );
    }

    pub fn fire(&self, event_type: &str, data: Value) {
        self.hass
            .bus
            .fire(Event::new(event_type, data, Context::new()));
    }

    pub async fn call(&self, service: &str, data: Value) -> ServiceResult {
        self.hass
            .services
            .call(DOMAIN, service, data, Context::new())
            .await
    }
}

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_for<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Give spawned listener and action tasks time to run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

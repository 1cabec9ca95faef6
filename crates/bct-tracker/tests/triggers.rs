//! Mapped entities and remote buttons driving the tracker

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bct_registries::{StorageError, StorageResult};
use bct_service_registry::ServiceError;
use bct_tracker::listener::TriggerListener;
use bct_tracker::mapping::MappingTable;
use bct_tracker::{
    ActivityStore, ActivityType, BabyCoordinator, BabySensors, CommandWorker, DiaperType,
    TrackerData,
};
use common::*;
use serde_json::json;

async fn diaper_count(host: &TestHost) -> usize {
    host.coordinator()
        .snapshot()
        .await
        .activities
        .iter()
        .filter(|r| r.diaper_type().is_some())
        .count()
}

#[tokio::test]
async fn test_switch_rising_edge_logs_one_diaper() {
    let host = TestHost::new();
    let h = &host;
    host.add_baby("Emma", &[("diaper_pee_entity", "switch.a")])
        .await;

    host.set_state("switch.a", "off");
    host.set_state("switch.a", "on");
    assert!(wait_for(move || async move { diaper_count(h).await == 1 }).await);

    let record = host
        .coordinator()
        .last_activity(ActivityType::Diaper)
        .await
        .unwrap();
    assert_eq!(record.diaper_type(), Some(DiaperType::Pee));
    assert_eq!(record.notes, "Button triggered");

    // on -> on and on -> off are not presses
    host.set_state("switch.a", "on");
    host.set_state("switch.a", "off");
    settle().await;
    assert_eq!(diaper_count(&host).await, 1);
}

#[tokio::test]
async fn test_button_entity_fires_on_every_press() {
    let host = TestHost::new();
    let h = &host;
    host.add_baby("Emma", &[("sleep_start_entity", "input_button.nap")])
        .await;

    host.set_state("input_button.nap", "2025-08-01T10:00:00");
    assert!(wait_for(move || async move { h.coordinator().is_sleeping().await }).await);

    host.clock.advance_minutes(5);
    host.set_state("input_button.nap", "2025-08-01T10:05:00");
    assert!(
        wait_for(move || async move {
            h.coordinator()
                .last_activity(ActivityType::Sleeping)
                .await
                .is_some()
        })
        .await
    );
    let closed = host
        .coordinator()
        .last_activity(ActivityType::Sleeping)
        .await
        .unwrap();
    assert_eq!(closed.notes, "Button triggered New sleep session started");
}

#[tokio::test]
async fn test_zha_press_matches_label() {
    let host = TestHost::new();
    let h = &host;
    host.register_remote("sensor.remote_action", "dev_remote");
    host.add_baby(
        "Emma",
        &[
            ("diaper_poo_entity", "sensor.remote_action:double"),
            ("feeding_start_left_entity", "sensor.remote_action:single"),
        ],
    )
    .await;

    host.fire(
        "zha_event",
        json!({"device_id": "dev_remote", "command": "double", "args": []}),
    );
    assert!(wait_for(move || async move { diaper_count(h).await == 1 }).await);

    host.fire(
        "zha_event",
        json!({"device_id": "dev_remote", "command": "single"}),
    );
    assert!(wait_for(move || async move { h.coordinator().is_feeding().await }).await);

    // Wrong label, unknown device and a malformed event do nothing
    host.fire("zha_event", json!({"device_id": "dev_remote", "command": "hold"}));
    host.fire("zha_event", json!({"device_id": "dev_other", "command": "double"}));
    host.fire("zha_event", json!({"command": "double"}));
    settle().await;
    assert_eq!(diaper_count(&host).await, 1);
    assert_eq!(host.coordinator().snapshot().await.activities.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_presses_apply_in_order() {
    let host = TestHost::new();
    let h = &host;
    host.add_baby(
        "Emma",
        &[
            ("feeding_start_left_entity", "input_button.start"),
            ("feeding_stop_entity", "input_button.stop"),
        ],
    )
    .await;

    for n in 0..50 {
        let pressed = format!("2025-08-01T10:00:{:02}", n);
        host.set_state("input_button.start", &pressed);
        host.set_state("input_button.stop", &pressed);
    }

    assert!(
        wait_for(move || async move {
            h.coordinator().snapshot().await.activities.len() == 50
        })
        .await
    );
    settle().await;

    // Every stop found its start already open
    let data = host.coordinator().snapshot().await;
    assert!(data.current_feeding.is_none());
    assert_eq!(data.activities.len(), 50);
    assert!(data
        .activities
        .iter()
        .all(|r| r.notes == "Button triggered Button triggered"));
    host.assert_state("binary_sensor.emma_currently_feeding", "off");
}

#[tokio::test]
async fn test_deconz_numeric_event() {
    let host = TestHost::new();
    let h = &host;
    host.register_remote("sensor.hue_dimmer", "dev_hue");
    host.add_baby("Emma", &[("wake_up_entity", "sensor.hue_dimmer:1002")])
        .await;

    host.call("log_sleep_start", json!({})).await.unwrap();
    host.clock.advance_hours(2);

    host.fire("deconz_event", json!({"device_id": "dev_hue", "event": 1002}));
    assert!(wait_for(move || async move { !h.coordinator().is_sleeping().await }).await);
    host.assert_state("sensor.emma_last_sleep_duration", "2.0");
}

#[tokio::test]
async fn test_mapping_administration_resubscribes() {
    let host = TestHost::new();
    let h = &host;
    let entry_id = host.add_baby("Emma", &[]).await;
    let options = |host: &TestHost| {
        host.hass
            .registries
            .config_entries
            .get(&entry_id)
            .unwrap()
            .options
    };

    host.call(
        "update_button_mapping",
        json!({"entity_id": "switch.b", "baby_care_action": "diaper_pee"}),
    )
    .await
    .unwrap();
    assert_eq!(options(&host)["diaper_pee_entity"], "switch.b");

    host.set_state("switch.b", "off");
    host.set_state("switch.b", "on");
    assert!(wait_for(move || async move { diaper_count(h).await == 1 }).await);

    // The same trigger moves to another action
    host.call(
        "update_button_mapping",
        json!({"entity_id": "switch.b", "baby_care_action": "diaper_poo"}),
    )
    .await
    .unwrap();
    let opts = options(&host);
    assert!(!opts.contains_key("diaper_pee_entity"));
    assert_eq!(opts["diaper_poo_entity"], "switch.b");

    host.set_state("switch.b", "off");
    host.set_state("switch.b", "on");
    assert!(wait_for(move || async move { diaper_count(h).await == 2 }).await);
    let last = host
        .coordinator()
        .last_activity(ActivityType::Diaper)
        .await
        .unwrap();
    assert_eq!(last.diaper_type(), Some(DiaperType::Poo));

    host.call("remove_button_mapping", json!({"entity_id": "switch.b"}))
        .await
        .unwrap();
    assert!(options(&host).is_empty());

    host.set_state("switch.b", "off");
    host.set_state("switch.b", "on");
    settle().await;
    assert_eq!(diaper_count(&host).await, 2);
}

#[tokio::test]
async fn test_remove_specific_label_only() {
    let host = TestHost::new();
    let entry_id = host
        .add_baby(
            "Emma",
            &[
                ("diaper_pee_entity", "sensor.remote_action:single"),
                ("diaper_poo_entity", "sensor.remote_action:double"),
            ],
        )
        .await;

    host.call(
        "remove_button_mapping",
        json!({"entity_id": "sensor.remote_action", "specific_action": "double"}),
    )
    .await
    .unwrap();

    let options = host
        .hass
        .registries
        .config_entries
        .get(&entry_id)
        .unwrap()
        .options;
    assert_eq!(options.len(), 1);
    assert_eq!(options["diaper_pee_entity"], "sensor.remote_action:single");
}

#[tokio::test]
async fn test_unknown_action_changes_nothing() {
    let host = TestHost::new();
    let entry_id = host.add_baby("Emma", &[("wake_up_entity", "switch.c")]).await;

    let err = host
        .call(
            "update_button_mapping",
            json!({"entity_id": "switch.d", "baby_care_action": "feed_the_cat"}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidData(_)));

    let options = host
        .hass
        .registries
        .config_entries
        .get(&entry_id)
        .unwrap()
        .options;
    assert_eq!(options.len(), 1);
    assert_eq!(options["wake_up_entity"], "switch.c");
}

struct FailingStore {
    saves: AtomicUsize,
}

#[async_trait]
impl ActivityStore for FailingStore {
    async fn load(&self) -> StorageResult<Option<TrackerData>> {
        Ok(None)
    }

    async fn save(&self, _data: &TrackerData) -> StorageResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        )))
    }

    async fn remove(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_failed_action_is_swallowed() {
    let host = TestHost::new();
    let store = Arc::new(FailingStore {
        saves: AtomicUsize::new(0),
    });
    let sensors = BabySensors::register(&host.hass, "entry_fail", "Noah").unwrap();
    let coordinator = Arc::new(BabyCoordinator::new(
        "entry_fail",
        "Noah",
        None,
        store.clone(),
        Arc::new(host.clock.clone()),
        sensors,
    ));

    let mut options = bct_tracker::Options::new();
    options.insert("diaper_both_entity".into(), json!("switch.e"));
    let worker = CommandWorker::start(coordinator.clone());
    let listener = TriggerListener::start(
        &host.hass,
        "Noah",
        MappingTable::from_options(&options),
        worker.sender(),
    );

    let saves = &store.saves;
    host.set_state("switch.e", "off");
    host.set_state("switch.e", "on");
    assert!(wait_for(move || async move { saves.load(Ordering::SeqCst) == 1 }).await);

    // The listener keeps running after the failure
    host.set_state("switch.e", "off");
    host.set_state("switch.e", "on");
    assert!(wait_for(move || async move { saves.load(Ordering::SeqCst) == 2 }).await);
    host.assert_state("sensor.noah_daily_diapers", "2");

    listener.stop().await;
    worker.drain().await;
}

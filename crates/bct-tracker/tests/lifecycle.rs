//! Service validation, multiple babies, YAML import and unloading

mod common;

use bct_config::AppConfig;
use bct_service_registry::ServiceError;
use bct_tracker::consts::{DOMAIN, SERVICES};
use bct_tracker::ActivityType;
use common::*;
use serde_json::json;

#[tokio::test]
async fn test_schema_rejects_bad_payloads() {
    let host = TestHost::new();
    host.add_baby("Emma", &[]).await;

    let bad = [
        ("start_feeding", json!({"side": "middle"})),
        ("start_feeding", json!({})),
        ("log_diaper", json!({"type": "wet"})),
        ("log_bottle_feeding", json!({"amount_ml": "a cup"})),
        ("log_growth", json!({"weight_kg": "heavy"})),
        ("stop_feeding", json!({"reason": "done"})),
    ];
    for (service, payload) in bad {
        let err = host.call(service, payload.clone()).await.unwrap_err();
        assert!(
            matches!(err, ServiceError::InvalidData(_)),
            "{} accepted {}",
            service,
            payload
        );
    }

    assert!(host.coordinator().snapshot().await.activities.is_empty());
    assert!(!host.coordinator().is_feeding().await);
}

#[tokio::test]
async fn test_baby_selector_with_two_babies() {
    let host = TestHost::new();
    let emma = host.add_baby("Emma", &[]).await;
    host.add_baby("Liam", &[]).await;

    let err = host
        .call("log_diaper", json!({"type": "pee"}))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidData(_)));

    host.call("log_diaper", json!({"type": "pee", "baby": "Liam"}))
        .await
        .unwrap();
    host.call("log_diaper", json!({"type": "poo", "baby": emma}))
        .await
        .unwrap();
    host.call("log_diaper", json!({"type": "both", "baby": "Liam"}))
        .await
        .unwrap();

    host.assert_state("sensor.emma_daily_diapers", "1");
    host.assert_state("sensor.liam_daily_diapers", "2");

    let liam = host.tracker.resolve(Some("Liam")).unwrap();
    assert_eq!(liam.daily_activities(ActivityType::Diaper).await.len(), 2);

    let err = host
        .call("log_diaper", json!({"type": "pee", "baby": "Noah"}))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidData(_)));
}

#[tokio::test]
async fn test_yaml_import_sets_up_babies() {
    let host = TestHost::new();
    std::fs::write(
        host.dir.path().join("configuration.yaml"),
        r#"
baby_care_tracker:
  babies:
    - baby_name: Emma
      birth_date: 2025-07-20
      mappings:
        diaper_pee_entity: switch.nursery_pee
"#,
    )
    .unwrap();

    let config = AppConfig::load(host.dir.path()).unwrap();
    let created = host.tracker.import_yaml(&config.tracker).await.unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(host.tracker.setup_all().await, 1);

    let coord = host.coordinator();
    assert_eq!(coord.baby_name(), "Emma");
    assert_eq!(
        coord.birth_date(),
        chrono::NaiveDate::from_ymd_opt(2025, 7, 20)
    );

    let h = &host;
    host.set_state("switch.nursery_pee", "off");
    host.set_state("switch.nursery_pee", "on");
    assert!(
        wait_for(move || async move {
            h.coordinator()
                .daily_activities(ActivityType::Diaper)
                .await
                .len()
                == 1
        })
        .await
    );

    // A second import leaves the existing entry alone
    assert!(host
        .tracker
        .import_yaml(&config.tracker)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_unload_removes_states_and_services() {
    let host = TestHost::new();
    let entry_id = host.add_baby("Emma", &[("diaper_pee_entity", "switch.a")]).await;

    assert_eq!(
        host.hass.services.domain_services(DOMAIN).len(),
        SERVICES.len()
    );
    host.assert_state("sensor.emma_current_activity", "Awake");
    host.assert_state("binary_sensor.emma_currently_sleeping", "off");

    assert!(host.tracker.unload_entry(&entry_id).await.unwrap());
    assert!(host.state("sensor.emma_current_activity").is_none());
    assert!(host.state("binary_sensor.emma_currently_sleeping").is_none());
    assert!(host.hass.services.domain_services(DOMAIN).is_empty());

    let err = host.call("log_diaper", json!({"type": "pee"})).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { .. }));

    // Nothing is logged while unloaded
    host.set_state("switch.a", "off");
    host.set_state("switch.a", "on");
    settle().await;
    host.tracker.setup_entry(&entry_id).await.unwrap();
    assert!(host.coordinator().snapshot().await.activities.is_empty());
    host.assert_state("sensor.emma_current_activity", "Awake");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unload_leaves_no_states_behind() {
    let host = TestHost::new();
    let h = &host;
    let entry_id = host
        .add_baby("Emma", &[("diaper_pee_entity", "input_button.pee")])
        .await;

    for n in 0..20 {
        host.set_state("input_button.pee", &format!("2025-08-01T10:00:{:02}", n));
    }
    assert!(
        wait_for(move || async move {
            !h.coordinator().snapshot().await.activities.is_empty()
        })
        .await
    );

    // Presses still queued finish before the states come down
    assert!(host.tracker.unload_entry(&entry_id).await.unwrap());
    settle().await;
    assert!(host.state("sensor.emma_daily_diapers").is_none());
    assert!(host.state("sensor.emma_current_activity").is_none());
    assert!(host.state("binary_sensor.emma_currently_feeding").is_none());

    host.tracker.setup_entry(&entry_id).await.unwrap();
    let saved = host.coordinator().snapshot().await.activities.len();
    assert!(saved >= 1 && saved <= 20);
    host.assert_state("sensor.emma_daily_diapers", &saved.to_string());
}

#[tokio::test]
async fn test_poller_refreshes_durations() {
    let host = TestHost::new();
    let dir = tempfile::TempDir::new().unwrap();
    let hass = std::sync::Arc::new(bct_tracker::Hass::new(dir.path()));
    let tracker = bct_tracker::BabyCareTracker::with_update_interval(
        hass.clone(),
        std::sync::Arc::new(host.clock.clone()),
        std::time::Duration::from_millis(20),
    );

    let entry = tracker.create_entry("Emma", None).await.unwrap();
    tracker.setup_entry(&entry.entry_id).await.unwrap();
    tracker
        .resolve(None)
        .unwrap()
        .start_feeding(bct_tracker::FeedingSide::Left, "", &bct_core::Context::new())
        .await
        .unwrap();
    assert_eq!(
        hass.states
            .get_state("sensor.emma_current_feeding_duration")
            .as_deref(),
        Some("0.0")
    );

    host.clock.advance_minutes(3);
    let states = hass.states.clone();
    assert!(
        wait_for(move || {
            let states = states.clone();
            async move {
                states
                    .get_state("sensor.emma_current_feeding_duration")
                    .as_deref()
                    == Some("3.0")
            }
        })
        .await
    );

    tracker.unload_all().await;
}

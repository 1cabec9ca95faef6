//! Session transitions, queries and persistence through the services

mod common;

use bct_tracker::{ActivityType, FeedingSide};
use common::*;
use serde_json::json;

#[tokio::test]
async fn test_feeding_records_elapsed_seconds() {
    let host = TestHost::new();
    host.add_baby("Emma", &[]).await;

    host.call("start_feeding", json!({"side": "left"}))
        .await
        .unwrap();
    host.assert_state("binary_sensor.emma_currently_feeding", "on");

    host.clock.advance_seconds(600);
    host.call("stop_feeding", json!({})).await.unwrap();

    let coord = host.coordinator();
    let data = coord.snapshot().await;
    assert!(data.current_feeding.is_none());
    assert_eq!(data.activities.len(), 1);
    assert_eq!(data.activities[0].duration_seconds(), Some(600.0));
    assert_eq!(data.activities[0].side(), Some(FeedingSide::Left));

    host.assert_state("binary_sensor.emma_currently_feeding", "off");
    host.assert_state("sensor.emma_last_feeding_time", "2025-08-01T10:10:00");
    host.assert_state("sensor.emma_feeding_side", "left");
}

#[tokio::test]
async fn test_switching_sides_closes_previous_feeding() {
    let host = TestHost::new();
    host.add_baby("Emma", &[]).await;

    host.call("start_feeding", json!({"side": "left", "notes": "hungry"}))
        .await
        .unwrap();
    host.clock.advance_minutes(8);
    host.call("start_feeding", json!({"side": "right"}))
        .await
        .unwrap();

    let data = host.coordinator().snapshot().await;
    assert_eq!(data.activities.len(), 1);
    assert_eq!(data.activities[0].notes, "hungry Switching sides");
    assert_eq!(data.activities[0].side(), Some(FeedingSide::Left));
    assert_eq!(
        data.current_feeding.as_ref().map(|f| f.side),
        Some(FeedingSide::Right)
    );
    host.assert_state("sensor.emma_current_activity", "Feeding (right)");
}

#[tokio::test]
async fn test_new_sleep_closes_open_sleep() {
    let host = TestHost::new();
    host.add_baby("Emma", &[]).await;

    host.call("log_sleep_start", json!({})).await.unwrap();
    host.clock.advance_minutes(90);
    host.call("log_sleep_start", json!({"notes": "second nap"}))
        .await
        .unwrap();

    let data = host.coordinator().snapshot().await;
    assert_eq!(data.activities.len(), 1);
    assert_eq!(data.activities[0].notes, "New sleep session started");
    assert_eq!(data.activities[0].duration_seconds(), Some(5400.0));
    assert_eq!(
        data.current_sleep.as_ref().map(|s| s.notes.as_str()),
        Some("second nap")
    );
    host.assert_state("sensor.emma_last_sleep_duration", "1.5");
    host.assert_state("sensor.emma_sleep_status", "Sleeping");
}

#[tokio::test]
async fn test_stop_while_idle_is_noop() {
    let host = TestHost::new();
    host.add_baby("Emma", &[]).await;

    host.call("stop_feeding", json!({})).await.unwrap();
    host.call("log_wake_up", json!({})).await.unwrap();

    let data = host.coordinator().snapshot().await;
    assert!(data.activities.is_empty());
    assert!(data.current_feeding.is_none() && data.current_sleep.is_none());
}

#[tokio::test]
async fn test_daily_counts_reset_at_midnight() {
    let host = TestHost::new();
    host.clock.set(at(2025, 8, 1, 23, 50));
    host.add_baby("Emma", &[]).await;

    host.call("log_diaper", json!({"type": "both"})).await.unwrap();
    host.assert_state("sensor.emma_daily_diapers", "1");

    host.clock.advance_minutes(20);
    let coord = host.coordinator();
    assert!(coord.daily_activities(ActivityType::Diaper).await.is_empty());
    assert_eq!(
        coord
            .daily_activities_on(ActivityType::Diaper, at(2025, 8, 1, 0, 0).date())
            .await
            .len(),
        1
    );

    coord.refresh(&bct_core::Context::new()).await;
    host.assert_state("sensor.emma_daily_diapers", "0");
    host.assert_state("sensor.emma_last_diaper_time", "2025-08-01T23:50:00");
}

#[tokio::test]
async fn test_last_activity_uses_latest_timestamp() {
    let host = TestHost::new();
    host.add_baby("Emma", &[]).await;

    host.call("log_diaper", json!({"type": "pee"})).await.unwrap();
    host.clock.advance_minutes(30);
    host.call("log_diaper", json!({"type": "poo", "notes": "big one"}))
        .await
        .unwrap();
    host.call("log_bottle_feeding", json!({"amount_ml": "120"}))
        .await
        .unwrap();
    host.call("log_growth", json!({"weight_kg": 4.1, "height_cm": "54.5"}))
        .await
        .unwrap();

    let coord = host.coordinator();
    let last = coord.last_activity(ActivityType::Diaper).await.unwrap();
    assert_eq!(last.notes, "big one");
    assert!(coord.last_activity(ActivityType::Sleeping).await.is_none());

    let data = coord.snapshot().await;
    assert_eq!(data.activities.len(), 4);
    assert_eq!(
        data.activities[2].kind,
        bct_tracker::ActivityKind::BottleFeeding { amount_ml: 120 }
    );
    assert_eq!(
        data.activities[3].kind,
        bct_tracker::ActivityKind::Growth {
            weight_kg: Some(4.1),
            height_cm: Some(54.5)
        }
    );
    host.assert_state("sensor.emma_daily_diapers", "2");
}

#[tokio::test]
async fn test_state_survives_restart() {
    let host = TestHost::new();
    host.add_baby("Emma", &[]).await;

    host.call("log_diaper", json!({"type": "pee"})).await.unwrap();
    host.call("start_feeding", json!({"side": "right"}))
        .await
        .unwrap();

    let host = host.restart().await;
    let data = host.coordinator().snapshot().await;
    assert_eq!(data.activities.len(), 1);
    assert_eq!(
        data.current_feeding.as_ref().map(|f| f.side),
        Some(FeedingSide::Right)
    );
    host.assert_state("sensor.emma_current_activity", "Feeding (right)");
    host.assert_state("sensor.emma_daily_diapers", "1");

    // Sensor entity ids survive through the entity registry
    assert!(host
        .hass
        .registries
        .entities
        .is_registered("sensor.emma_current_activity"));
    assert!(!host
        .hass
        .registries
        .entities
        .is_registered("sensor.emma_current_activity_2"));
}

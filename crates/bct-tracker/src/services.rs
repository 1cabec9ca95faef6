//! Services in the `baby_care_tracker` domain
//!
//! Registered once for the whole domain. Each call names its baby through
//! the optional `baby` field (baby name or config entry id), which may be
//! left out while only one baby is set up.

use std::future::Future;
use std::sync::{Arc, Weak};

use bct_core::{Context, ServiceCall};
use bct_service_registry::{ServiceDescription, ServiceError, ServiceRegistry};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::activity::{DiaperType, FeedingSide};
use crate::consts::*;
use crate::error::TrackerResult;
use crate::integration::BabyCareTracker;

#[derive(Debug, Deserialize)]
pub struct StartFeedingData {
    #[serde(default)]
    pub baby: Option<String>,
    pub side: FeedingSide,
    #[serde(default)]
    pub notes: String,
}

/// Payload of the services that only take notes
#[derive(Debug, Deserialize)]
pub struct NotesData {
    #[serde(default)]
    pub baby: Option<String>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct LogDiaperData {
    #[serde(default)]
    pub baby: Option<String>,
    #[serde(rename = "type")]
    pub diaper_type: DiaperType,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct BottleFeedingData {
    #[serde(default)]
    pub baby: Option<String>,
    #[serde(deserialize_with = "int_or_numeric_string")]
    pub amount_ml: i64,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct GrowthData {
    #[serde(default)]
    pub baby: Option<String>,
    #[serde(default, deserialize_with = "opt_float_or_numeric_string")]
    pub weight_kg: Option<f64>,
    #[serde(default, deserialize_with = "opt_float_or_numeric_string")]
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMappingData {
    #[serde(default)]
    pub baby: Option<String>,
    pub entity_id: String,
    #[serde(default)]
    pub trigger_action: Option<String>,
    pub baby_care_action: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoveMappingData {
    #[serde(default)]
    pub baby: Option<String>,
    pub entity_id: String,
    #[serde(default)]
    pub specific_action: Option<String>,
}

/// Whole numbers only; `120.0` counts as one
fn int_or_numeric_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
            .ok_or_else(|| de::Error::custom(format!("{} is not an integer", n))),
        Value::String(s) => s.trim().parse().map_err(de::Error::custom),
        other => Err(de::Error::custom(format!("expected an integer, got {}", other))),
    }
}

fn opt_float_or_numeric_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<f64>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) => s.trim().parse().map(Some).map_err(de::Error::custom),
        other => Err(de::Error::custom(format!("expected a number, got {}", other))),
    }
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    let mut properties = properties;
    if let Some(map) = properties.as_object_mut() {
        map.insert("baby".into(), json!({"type": "string", "minLength": 1}));
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

fn notes_schema() -> Value {
    object_schema(json!({"notes": {"type": "string"}}), &[])
}

pub fn start_feeding_schema() -> Value {
    object_schema(
        json!({
            "side": {"type": "string", "enum": ["left", "right"]},
            "notes": {"type": "string"}
        }),
        &["side"],
    )
}

pub fn log_diaper_schema() -> Value {
    object_schema(
        json!({
            "type": {"type": "string", "enum": ["pee", "poo", "both"]},
            "notes": {"type": "string"}
        }),
        &["type"],
    )
}

pub fn bottle_feeding_schema() -> Value {
    object_schema(
        json!({
            "amount_ml": {
                "type": ["integer", "string"],
                "minimum": 0,
                "pattern": "^\\s*\\d+\\s*$"
            },
            "notes": {"type": "string"}
        }),
        &["amount_ml"],
    )
}

pub fn growth_schema() -> Value {
    let measurement = json!({
        "type": ["number", "string"],
        "minimum": 0,
        "pattern": "^\\s*\\d+(\\.\\d+)?\\s*$"
    });
    object_schema(
        json!({
            "weight_kg": measurement.clone(),
            "height_cm": measurement,
            "notes": {"type": "string"}
        }),
        &[],
    )
}

/// `baby_care_action` is a plain string so an unknown action reaches the
/// handler and is logged there
pub fn update_mapping_schema() -> Value {
    object_schema(
        json!({
            "entity_id": {"type": "string", "minLength": 1},
            "trigger_action": {"type": "string"},
            "baby_care_action": {"type": "string", "minLength": 1}
        }),
        &["entity_id", "baby_care_action"],
    )
}

pub fn remove_mapping_schema() -> Value {
    object_schema(
        json!({
            "entity_id": {"type": "string", "minLength": 1},
            "specific_action": {"type": "string"}
        }),
        &["entity_id"],
    )
}

/// Register one service whose payload parses into `D`
///
/// The handler gets the live integration; a call arriving after the
/// integration was dropped fails.
fn register<D, F, Fut>(
    registry: &ServiceRegistry,
    tracker: &Weak<BabyCareTracker>,
    service: &str,
    description: &str,
    schema: Value,
    handler: F,
) -> Result<(), ServiceError>
where
    D: DeserializeOwned + Send + 'static,
    F: Fn(Arc<BabyCareTracker>, D, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TrackerResult<()>> + Send + 'static,
{
    let tracker = tracker.clone();
    let service_name = service.to_string();

    registry.register_with_description(
        ServiceDescription::new(DOMAIN, service)
            .with_description(description)
            .with_schema(schema),
        move |call: ServiceCall| {
            let prepared = tracker
                .upgrade()
                .ok_or_else(|| ServiceError::CallFailed(format!("{} is not set up", DOMAIN)))
                .and_then(|tracker| {
                    let data = call
                        .parse::<D>()
                        .map_err(|e| ServiceError::InvalidData(e.to_string()))?;
                    Ok(handler(tracker, data, call.context.clone()))
                });
            let service_name = service_name.clone();

            async move {
                let result = match prepared {
                    Ok(fut) => fut.await.map_err(ServiceError::from),
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => Ok(None),
                    Err(e) => {
                        warn!(service = %service_name, error = %e, "Service call failed");
                        Err(e)
                    }
                }
            }
        },
    )
}

async fn start_feeding(
    tracker: Arc<BabyCareTracker>,
    data: StartFeedingData,
    context: Context,
) -> TrackerResult<()> {
    let coordinator = tracker.resolve(data.baby.as_deref())?;
    coordinator
        .start_feeding(data.side, &data.notes, &context)
        .await?;
    Ok(())
}

async fn stop_feeding(
    tracker: Arc<BabyCareTracker>,
    data: NotesData,
    context: Context,
) -> TrackerResult<()> {
    let coordinator = tracker.resolve(data.baby.as_deref())?;
    coordinator.stop_feeding(&data.notes, &context).await?;
    Ok(())
}

async fn log_diaper(
    tracker: Arc<BabyCareTracker>,
    data: LogDiaperData,
    context: Context,
) -> TrackerResult<()> {
    let coordinator = tracker.resolve(data.baby.as_deref())?;
    coordinator
        .log_diaper(data.diaper_type, &data.notes, &context)
        .await?;
    info!(baby = %coordinator.baby_name(), diaper_type = %data.diaper_type, "Logged diaper change");
    Ok(())
}

async fn log_sleep_start(
    tracker: Arc<BabyCareTracker>,
    data: NotesData,
    context: Context,
) -> TrackerResult<()> {
    let coordinator = tracker.resolve(data.baby.as_deref())?;
    coordinator.start_sleep(&data.notes, &context).await?;
    Ok(())
}

async fn log_wake_up(
    tracker: Arc<BabyCareTracker>,
    data: NotesData,
    context: Context,
) -> TrackerResult<()> {
    let coordinator = tracker.resolve(data.baby.as_deref())?;
    coordinator.wake_up(&data.notes, &context).await?;
    Ok(())
}

async fn log_bottle_feeding(
    tracker: Arc<BabyCareTracker>,
    data: BottleFeedingData,
    context: Context,
) -> TrackerResult<()> {
    let coordinator = tracker.resolve(data.baby.as_deref())?;
    coordinator
        .log_bottle_feeding(data.amount_ml, &data.notes, &context)
        .await?;
    info!(baby = %coordinator.baby_name(), amount_ml = data.amount_ml, "Logged bottle feeding");
    Ok(())
}

async fn log_growth(
    tracker: Arc<BabyCareTracker>,
    data: GrowthData,
    context: Context,
) -> TrackerResult<()> {
    let coordinator = tracker.resolve(data.baby.as_deref())?;
    coordinator
        .log_growth(data.weight_kg, data.height_cm, &data.notes, &context)
        .await?;
    info!(
        baby = %coordinator.baby_name(),
        weight_kg = ?data.weight_kg,
        height_cm = ?data.height_cm,
        "Logged growth measurement"
    );
    Ok(())
}

async fn update_button_mapping(
    tracker: Arc<BabyCareTracker>,
    data: UpdateMappingData,
    _context: Context,
) -> TrackerResult<()> {
    tracker
        .update_button_mapping(
            data.baby.as_deref(),
            &data.entity_id,
            data.trigger_action.as_deref(),
            &data.baby_care_action,
        )
        .await
}

async fn remove_button_mapping(
    tracker: Arc<BabyCareTracker>,
    data: RemoveMappingData,
    _context: Context,
) -> TrackerResult<()> {
    tracker
        .remove_button_mapping(
            data.baby.as_deref(),
            &data.entity_id,
            data.specific_action.as_deref(),
        )
        .await?;
    Ok(())
}

/// Register every service of the domain
pub fn register_services(
    registry: &ServiceRegistry,
    tracker: &Weak<BabyCareTracker>,
) -> TrackerResult<()> {
    register(
        registry,
        tracker,
        SERVICE_START_FEEDING,
        "Start a breastfeeding session",
        start_feeding_schema(),
        start_feeding,
    )?;
    register(
        registry,
        tracker,
        SERVICE_STOP_FEEDING,
        "Stop the current feeding session",
        notes_schema(),
        stop_feeding,
    )?;
    register(
        registry,
        tracker,
        SERVICE_LOG_DIAPER,
        "Log a diaper change",
        log_diaper_schema(),
        log_diaper,
    )?;
    register(
        registry,
        tracker,
        SERVICE_LOG_SLEEP_START,
        "Start a sleep session",
        notes_schema(),
        log_sleep_start,
    )?;
    register(
        registry,
        tracker,
        SERVICE_LOG_WAKE_UP,
        "End the current sleep session",
        notes_schema(),
        log_wake_up,
    )?;
    register(
        registry,
        tracker,
        SERVICE_LOG_BOTTLE_FEEDING,
        "Log a bottle feeding",
        bottle_feeding_schema(),
        log_bottle_feeding,
    )?;
    register(
        registry,
        tracker,
        SERVICE_LOG_GROWTH,
        "Log weight and height",
        growth_schema(),
        log_growth,
    )?;
    register(
        registry,
        tracker,
        SERVICE_UPDATE_BUTTON_MAPPING,
        "Map an entity or button press to a tracker action",
        update_mapping_schema(),
        update_button_mapping,
    )?;
    register(
        registry,
        tracker,
        SERVICE_REMOVE_BUTTON_MAPPING,
        "Remove the mappings of an entity",
        remove_mapping_schema(),
        remove_button_mapping,
    )?;

    info!(count = SERVICES.len(), "Registered baby care services");
    Ok(())
}

pub fn unregister_services(registry: &ServiceRegistry) -> usize {
    registry.unregister_domain(DOMAIN)
}

//! Sensors and binary sensors published for each baby
//!
//! Every sensor is a pure reading of [`TrackerData`] at a point in time.
//! [`BabySensors`] registers the entities and the baby's device, then
//! writes all readings to the state store on each refresh.

use std::collections::HashMap;

use bct_core::{slugify, Context, EntityId, STATE_OFF, STATE_ON, STATE_UNKNOWN};
use bct_registries::{DeviceIdentifier, DeviceInfo};
use bct_state_store::SharedStateStore;
use chrono::NaiveDateTime;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::activity::{ActivityType, FeedingSide};
use crate::consts::{DEVICE_MANUFACTURER, DEVICE_MODEL, DOMAIN};
use crate::error::TrackerResult;
use crate::hass::Hass;
use crate::session::TrackerData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKey {
    CurrentActivity,
    LastFeedingTime,
    LastSleepDuration,
    DailyFeedings,
    DailyDiapers,
    SleepStatus,
    CurrentFeedingDuration,
    CurrentSleepDuration,
    LastDiaperTime,
    FeedingSide,
    CurrentlyFeeding,
    CurrentlySleeping,
}

impl SensorKey {
    pub const ALL: [SensorKey; 12] = [
        Self::CurrentActivity,
        Self::LastFeedingTime,
        Self::LastSleepDuration,
        Self::DailyFeedings,
        Self::DailyDiapers,
        Self::SleepStatus,
        Self::CurrentFeedingDuration,
        Self::CurrentSleepDuration,
        Self::LastDiaperTime,
        Self::FeedingSide,
        Self::CurrentlyFeeding,
        Self::CurrentlySleeping,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::CurrentActivity => "current_activity",
            Self::LastFeedingTime => "last_feeding_time",
            Self::LastSleepDuration => "last_sleep_duration",
            Self::DailyFeedings => "daily_feedings",
            Self::DailyDiapers => "daily_diapers",
            Self::SleepStatus => "sleep_status",
            Self::CurrentFeedingDuration => "current_feeding_duration",
            Self::CurrentSleepDuration => "current_sleep_duration",
            Self::LastDiaperTime => "last_diaper_time",
            Self::FeedingSide => "feeding_side",
            Self::CurrentlyFeeding => "currently_feeding",
            Self::CurrentlySleeping => "currently_sleeping",
        }
    }

    pub fn domain(&self) -> &'static str {
        match self {
            Self::CurrentlyFeeding | Self::CurrentlySleeping => "binary_sensor",
            _ => "sensor",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::CurrentActivity => "Current Activity",
            Self::LastFeedingTime => "Last Feeding Time",
            Self::LastSleepDuration => "Last Sleep Duration",
            Self::DailyFeedings => "Daily Feedings",
            Self::DailyDiapers => "Daily Diapers",
            Self::SleepStatus => "Sleep Status",
            Self::CurrentFeedingDuration => "Current Feeding Duration",
            Self::CurrentSleepDuration => "Current Sleep Duration",
            Self::LastDiaperTime => "Last Diaper Time",
            Self::FeedingSide => "Feeding Side",
            Self::CurrentlyFeeding => "Currently Feeding",
            Self::CurrentlySleeping => "Currently Sleeping",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::CurrentActivity => "mdi:baby",
            Self::LastFeedingTime | Self::FeedingSide | Self::CurrentlyFeeding => {
                "mdi:baby-bottle"
            }
            Self::LastSleepDuration | Self::SleepStatus | Self::CurrentlySleeping => "mdi:sleep",
            Self::DailyFeedings => "mdi:counter",
            Self::DailyDiapers | Self::LastDiaperTime => "mdi:baby-carriage",
            Self::CurrentFeedingDuration | Self::CurrentSleepDuration => "mdi:timer",
        }
    }

    /// The last-time sensors carry no device class: their state is a local
    /// time without an offset
    pub fn device_class(&self) -> Option<&'static str> {
        match self {
            Self::LastSleepDuration | Self::CurrentFeedingDuration | Self::CurrentSleepDuration => {
                Some("duration")
            }
            Self::CurrentlySleeping => Some("occupancy"),
            _ => None,
        }
    }

    pub fn unit_of_measurement(&self) -> Option<&'static str> {
        match self {
            Self::LastSleepDuration | Self::CurrentSleepDuration => Some("h"),
            Self::CurrentFeedingDuration => Some("min"),
            _ => None,
        }
    }

    pub fn state_class(&self) -> Option<&'static str> {
        match self {
            Self::LastSleepDuration | Self::CurrentFeedingDuration | Self::CurrentSleepDuration => {
                Some("measurement")
            }
            Self::DailyFeedings | Self::DailyDiapers => Some("total_increasing"),
            _ => None,
        }
    }
}

/// State value and extra attributes of one sensor
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub state: String,
    pub attributes: HashMap<String, Value>,
}

impl SensorReading {
    fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            attributes: HashMap::new(),
        }
    }

    fn unknown() -> Self {
        Self::new(STATE_UNKNOWN)
    }

    fn attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }
}

pub fn iso(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn minutes_since(start: &NaiveDateTime, now: &NaiveDateTime) -> f64 {
    round1((*now - *start).num_milliseconds() as f64 / 60_000.0)
}

fn hours_since(start: &NaiveDateTime, now: &NaiveDateTime) -> f64 {
    round1((*now - *start).num_milliseconds() as f64 / 3_600_000.0)
}

/// Read one sensor off the tracker data
pub fn read_sensor(key: SensorKey, data: &TrackerData, now: NaiveDateTime) -> SensorReading {
    let today = now.date();

    match key {
        SensorKey::CurrentActivity => {
            let state = match (&data.current_feeding, &data.current_sleep) {
                (Some(feeding), _) => format!("Feeding ({})", feeding.side),
                (None, Some(_)) => "Sleeping".to_string(),
                (None, None) => "Awake".to_string(),
            };
            let mut reading = SensorReading::new(state);
            if let Some(feeding) = &data.current_feeding {
                reading = reading
                    .attr("feeding_side", feeding.side.as_str())
                    .attr("feeding_start_time", iso(&feeding.start_time))
                    .attr(
                        "feeding_duration_minutes",
                        minutes_since(&feeding.start_time, &now),
                    );
            }
            if let Some(sleep) = &data.current_sleep {
                reading = reading
                    .attr("sleep_start_time", iso(&sleep.start_time))
                    .attr("sleep_duration_hours", hours_since(&sleep.start_time, &now));
            }
            reading
        }

        SensorKey::LastFeedingTime => match data.last_activity(ActivityType::Feeding) {
            Some(last) => SensorReading::new(iso(&last.timestamp))
                .attr("side", last.side().map(|s| s.as_str()))
                .attr(
                    "duration_minutes",
                    round1(last.duration_seconds().unwrap_or(0.0) / 60.0),
                )
                .attr("notes", last.notes.as_str()),
            None => SensorReading::unknown(),
        },

        SensorKey::LastSleepDuration => match data.last_activity(ActivityType::Sleeping) {
            Some(last) => {
                let state = last
                    .duration_seconds()
                    .map(|s| format!("{:.1}", s / 3600.0))
                    .unwrap_or_else(|| STATE_UNKNOWN.to_string());
                SensorReading::new(state)
                    .attr("start_time", last.start_time().map(|t| iso(&t)))
                    .attr("end_time", last.end_time().map(|t| iso(&t)))
                    .attr("notes", last.notes.as_str())
            }
            None => SensorReading::unknown(),
        },

        SensorKey::DailyFeedings => {
            let feedings = data.daily_activities(ActivityType::Feeding, today);
            let total: f64 = feedings.iter().filter_map(|f| f.duration_seconds()).sum();
            let count_side =
                |side: FeedingSide| feedings.iter().filter(|f| f.side() == Some(side)).count();

            SensorReading::new(feedings.len().to_string())
                .attr("total_duration_minutes", round1(total / 60.0))
                .attr("left_breast_count", count_side(FeedingSide::Left))
                .attr("right_breast_count", count_side(FeedingSide::Right))
        }

        SensorKey::DailyDiapers => {
            let diapers = data.daily_activities(ActivityType::Diaper, today);
            let pee = diapers
                .iter()
                .filter(|d| d.diaper_type().is_some_and(|t| t.has_pee()))
                .count();
            let poo = diapers
                .iter()
                .filter(|d| d.diaper_type().is_some_and(|t| t.has_poo()))
                .count();

            SensorReading::new(diapers.len().to_string())
                .attr("pee_count", pee)
                .attr("poo_count", poo)
        }

        SensorKey::SleepStatus => match &data.current_sleep {
            Some(sleep) => SensorReading::new("Sleeping")
                .attr("sleep_start_time", iso(&sleep.start_time))
                .attr("current_duration_hours", hours_since(&sleep.start_time, &now)),
            None => SensorReading::new("Awake"),
        },

        SensorKey::CurrentFeedingDuration => match &data.current_feeding {
            Some(feeding) => {
                SensorReading::new(format!("{:.1}", minutes_since(&feeding.start_time, &now)))
            }
            None => SensorReading::unknown(),
        },

        SensorKey::CurrentSleepDuration => match &data.current_sleep {
            Some(sleep) => {
                SensorReading::new(format!("{:.1}", hours_since(&sleep.start_time, &now)))
            }
            None => SensorReading::unknown(),
        },

        SensorKey::LastDiaperTime => match data.last_activity(ActivityType::Diaper) {
            Some(last) => SensorReading::new(iso(&last.timestamp))
                .attr("diaper_type", last.diaper_type().map(|t| t.as_str()))
                .attr("notes", last.notes.as_str()),
            None => SensorReading::unknown(),
        },

        SensorKey::FeedingSide => {
            if let Some(feeding) = &data.current_feeding {
                return SensorReading::new(feeding.side.as_str())
                    .attr("status", "Currently feeding");
            }
            match data.last_activity(ActivityType::Feeding) {
                Some(last) => SensorReading::new(
                    last.side().map(|s| s.as_str()).unwrap_or(STATE_UNKNOWN),
                )
                .attr("status", "Last feeding")
                .attr("timestamp", iso(&last.timestamp)),
                None => SensorReading::unknown().attr("status", "No feeding recorded"),
            }
        }

        SensorKey::CurrentlyFeeding => match &data.current_feeding {
            Some(feeding) => SensorReading::new(STATE_ON)
                .attr("feeding_side", feeding.side.as_str())
                .attr("start_time", iso(&feeding.start_time))
                .attr("duration_minutes", minutes_since(&feeding.start_time, &now))
                .attr("notes", feeding.notes.as_str()),
            None => SensorReading::new(STATE_OFF),
        },

        SensorKey::CurrentlySleeping => match &data.current_sleep {
            Some(sleep) => SensorReading::new(STATE_ON)
                .attr("start_time", iso(&sleep.start_time))
                .attr("duration_hours", hours_since(&sleep.start_time, &now))
                .attr("notes", sleep.notes.as_str()),
            None => SensorReading::new(STATE_OFF),
        },
    }
}

/// `baby_care_tracker_<name>_<key>`, lowercased, spaces as underscores
pub fn unique_id(baby_name: &str, key: SensorKey) -> String {
    format!("{}_{}_{}", DOMAIN, baby_name, key.key())
        .to_lowercase()
        .replace(' ', "_")
}

pub fn device_info(baby_name: &str) -> DeviceInfo {
    DeviceInfo {
        identifiers: vec![DeviceIdentifier::new(DOMAIN, baby_name)],
        name: Some(format!("Baby Care - {}", baby_name)),
        manufacturer: Some(DEVICE_MANUFACTURER.to_string()),
        model: Some(DEVICE_MODEL.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct SensorEntity {
    pub key: SensorKey,
    pub entity_id: EntityId,
    pub unique_id: String,
    pub name: String,
}

/// The registered sensors of one baby
pub struct BabySensors {
    states: SharedStateStore,
    device_id: String,
    entities: Vec<SensorEntity>,
}

impl BabySensors {
    /// Register the baby's device and its sensor entities
    ///
    /// Entities registered earlier keep their entity_id.
    #[instrument(skip(hass))]
    pub fn register(hass: &Hass, entry_id: &str, baby_name: &str) -> TrackerResult<Self> {
        let registries = &hass.registries;
        let device = registries
            .devices
            .get_or_create(&device_info(baby_name), Some(entry_id));
        let slug = slugify(baby_name);

        let mut entities = Vec::with_capacity(SensorKey::ALL.len());
        for key in SensorKey::ALL {
            let unique_id = unique_id(baby_name, key);
            let entity_id = match registries.entities.get_by_unique_id(&unique_id) {
                Some(existing) => existing.entity_id.clone(),
                None => registries.entities.generate_entity_id(
                    key.domain(),
                    &format!("{}_{}", slug, key.key()),
                    None,
                ),
            };

            let name = format!("{} {}", baby_name, key.title());
            registries.entities.get_or_create(
                DOMAIN,
                &entity_id,
                Some(&unique_id),
                Some(entry_id),
                Some(&device.id),
            );
            let updated = registries.entities.update(&entity_id, |entry| {
                entry.original_name = Some(name.clone());
                entry.original_icon = Some(key.icon().to_string());
                entry.original_device_class = key.device_class().map(str::to_string);
                entry.unit_of_measurement = key.unit_of_measurement().map(str::to_string);
                entry.device_id = Some(device.id.clone());
                entry.config_entry_id = Some(entry_id.to_string());
            });
            if let Err(e) = updated {
                warn!(%entity_id, error = %e, "Could not update registry entry");
            }

            entities.push(SensorEntity {
                key,
                entity_id: entity_id.parse()?,
                unique_id,
                name,
            });
        }

        debug!(count = entities.len(), device_id = %device.id, "Registered sensors");
        Ok(Self {
            states: hass.states.clone(),
            device_id: device.id.clone(),
            entities,
        })
    }

    pub fn entities(&self) -> &[SensorEntity] {
        &self.entities
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn entity_id(&self, key: SensorKey) -> Option<&EntityId> {
        self.entities
            .iter()
            .find(|e| e.key == key)
            .map(|e| &e.entity_id)
    }

    /// Write every reading to the state store
    pub fn publish(&self, data: &TrackerData, now: NaiveDateTime, context: &Context) {
        for entity in &self.entities {
            let reading = read_sensor(entity.key, data, now);

            let mut attributes = reading.attributes;
            attributes.insert("friendly_name".into(), json!(entity.name));
            attributes.insert("icon".into(), json!(entity.key.icon()));
            if let Some(device_class) = entity.key.device_class() {
                attributes.insert("device_class".into(), json!(device_class));
            }
            if let Some(unit) = entity.key.unit_of_measurement() {
                attributes.insert("unit_of_measurement".into(), json!(unit));
            }
            if let Some(state_class) = entity.key.state_class() {
                attributes.insert("state_class".into(), json!(state_class));
            }

            self.states.set(
                entity.entity_id.clone(),
                reading.state,
                attributes,
                context.clone(),
            );
        }
    }

    /// Take the published states down
    pub fn remove(&self) {
        for entity in &self.entities {
            self.states.remove(&entity.entity_id, Context::new());
        }
    }
}

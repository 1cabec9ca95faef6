//! Per-baby coordinator
//!
//! Owns the baby's [`TrackerData`] behind one async mutex. A transition
//! mutates the data, saves the whole document and republishes the sensors
//! before the lock is released, so saves land in the order the transitions
//! happened and no reader sees a half-applied close-then-open.

use std::sync::Arc;

use bct_core::Context;
use chrono::{NaiveDate, NaiveDateTime};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::action::Command;
use crate::activity::{ActivityKind, ActivityRecord, ActivityType, DiaperType, FeedingSide};
use crate::clock::Clock;
use crate::error::{TrackerError, TrackerResult};
use crate::sensor::BabySensors;
use crate::session::{Started, TrackerData};
use crate::store::ActivityStore;

pub struct BabyCoordinator {
    entry_id: String,
    baby_name: String,
    birth_date: Option<NaiveDate>,
    data: Mutex<TrackerData>,
    store: Arc<dyn ActivityStore>,
    clock: Arc<dyn Clock>,
    sensors: BabySensors,
}

impl BabyCoordinator {
    pub fn new(
        entry_id: impl Into<String>,
        baby_name: impl Into<String>,
        birth_date: Option<NaiveDate>,
        store: Arc<dyn ActivityStore>,
        clock: Arc<dyn Clock>,
        sensors: BabySensors,
    ) -> Self {
        Self {
            entry_id: entry_id.into(),
            baby_name: baby_name.into(),
            birth_date,
            data: Mutex::new(TrackerData::default()),
            store,
            clock,
            sensors,
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn baby_name(&self) -> &str {
        &self.baby_name
    }

    pub fn birth_date(&self) -> Option<NaiveDate> {
        self.birth_date
    }

    pub fn sensors(&self) -> &BabySensors {
        &self.sensors
    }

    /// Read the stored document and publish the first sensor states
    #[instrument(skip(self), fields(baby = %self.baby_name))]
    pub async fn load(&self) -> TrackerResult<()> {
        let loaded = self.store.load().await?.unwrap_or_default();
        debug!(
            activities = loaded.activities.len(),
            feeding = loaded.is_feeding(),
            sleeping = loaded.is_sleeping(),
            "Loaded tracker data"
        );

        let mut data = self.data.lock().await;
        *data = loaded;
        self.sensors.publish(&data, self.clock.now(), &Context::new());
        Ok(())
    }

    /// Republish sensor states against the current time
    pub async fn refresh(&self, context: &Context) {
        let data = self.data.lock().await;
        self.sensors.publish(&data, self.clock.now(), context);
    }

    /// Save and publish while the caller still holds the lock
    async fn commit(
        &self,
        data: &TrackerData,
        now: NaiveDateTime,
        context: &Context,
    ) -> TrackerResult<()> {
        let saved = self.store.save(data).await;
        self.sensors.publish(data, now, context);
        saved.map_err(TrackerError::from)
    }

    pub async fn start_feeding(
        &self,
        side: FeedingSide,
        notes: &str,
        context: &Context,
    ) -> TrackerResult<Started> {
        let mut data = self.data.lock().await;
        let now = self.clock.now();
        let started = data.start_feeding(side, notes, now);
        self.commit(&data, now, context).await?;
        Ok(started)
    }

    /// `Ok(None)` when no feeding was open; nothing is saved then
    pub async fn stop_feeding(
        &self,
        notes: &str,
        context: &Context,
    ) -> TrackerResult<Option<ActivityRecord>> {
        let mut data = self.data.lock().await;
        let now = self.clock.now();
        let Some(record) = data.stop_feeding(notes, now) else {
            return Ok(None);
        };
        self.commit(&data, now, context).await?;
        Ok(Some(record))
    }

    pub async fn start_sleep(&self, notes: &str, context: &Context) -> TrackerResult<Started> {
        let mut data = self.data.lock().await;
        let now = self.clock.now();
        let started = data.start_sleep(notes, now);
        self.commit(&data, now, context).await?;
        Ok(started)
    }

    /// `Ok(None)` when no sleep was open; nothing is saved then
    pub async fn wake_up(
        &self,
        notes: &str,
        context: &Context,
    ) -> TrackerResult<Option<ActivityRecord>> {
        let mut data = self.data.lock().await;
        let now = self.clock.now();
        let Some(record) = data.wake_up(notes, now) else {
            return Ok(None);
        };
        self.commit(&data, now, context).await?;
        Ok(Some(record))
    }

    async fn append(
        &self,
        kind: ActivityKind,
        notes: &str,
        context: &Context,
    ) -> TrackerResult<ActivityRecord> {
        let mut data = self.data.lock().await;
        let now = self.clock.now();
        let record = data.log(kind, notes, now);
        self.commit(&data, now, context).await?;
        Ok(record)
    }

    pub async fn log_diaper(
        &self,
        diaper_type: DiaperType,
        notes: &str,
        context: &Context,
    ) -> TrackerResult<ActivityRecord> {
        self.append(ActivityKind::Diaper { diaper_type }, notes, context)
            .await
    }

    pub async fn log_bottle_feeding(
        &self,
        amount_ml: i64,
        notes: &str,
        context: &Context,
    ) -> TrackerResult<ActivityRecord> {
        if amount_ml < 0 {
            return Err(TrackerError::InvalidValue {
                field: "amount_ml".into(),
                reason: "must not be negative".into(),
            });
        }
        self.append(ActivityKind::BottleFeeding { amount_ml }, notes, context)
            .await
    }

    pub async fn log_growth(
        &self,
        weight_kg: Option<f64>,
        height_cm: Option<f64>,
        notes: &str,
        context: &Context,
    ) -> TrackerResult<ActivityRecord> {
        self.append(ActivityKind::Growth { weight_kg, height_cm }, notes, context)
            .await
    }

    /// Run one command with the given notes
    #[instrument(skip_all, fields(baby = %self.baby_name, command = command.name()))]
    pub async fn execute(
        &self,
        command: Command,
        notes: &str,
        context: &Context,
    ) -> TrackerResult<()> {
        match command {
            Command::StartFeeding { side } => {
                self.start_feeding(side, notes, context).await?;
            }
            Command::StopFeeding => {
                self.stop_feeding(notes, context).await?;
            }
            Command::StartSleep => {
                self.start_sleep(notes, context).await?;
            }
            Command::WakeUp => {
                self.wake_up(notes, context).await?;
            }
            Command::LogDiaper { diaper_type } => {
                let record = self.log_diaper(diaper_type, notes, context).await?;
                info!(diaper_type = %diaper_type, at = %record.timestamp, "Logged diaper change");
            }
            Command::LogBottleFeeding { amount_ml } => {
                self.log_bottle_feeding(amount_ml, notes, context).await?;
                info!(amount_ml, "Logged bottle feeding");
            }
            Command::LogGrowth {
                weight_kg,
                height_cm,
            } => {
                self.log_growth(weight_kg, height_cm, notes, context).await?;
                info!(?weight_kg, ?height_cm, "Logged growth measurement");
            }
        }
        Ok(())
    }

    pub async fn snapshot(&self) -> TrackerData {
        self.data.lock().await.clone()
    }

    pub async fn is_feeding(&self) -> bool {
        self.data.lock().await.is_feeding()
    }

    pub async fn is_sleeping(&self) -> bool {
        self.data.lock().await.is_sleeping()
    }

    /// Records of one kind logged today, by the coordinator's clock
    pub async fn daily_activities(&self, activity_type: ActivityType) -> Vec<ActivityRecord> {
        let today = self.clock.now().date();
        self.daily_activities_on(activity_type, today).await
    }

    pub async fn daily_activities_on(
        &self,
        activity_type: ActivityType,
        date: NaiveDate,
    ) -> Vec<ActivityRecord> {
        self.data
            .lock()
            .await
            .daily_activities(activity_type, date)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn last_activity(&self, activity_type: ActivityType) -> Option<ActivityRecord> {
        self.data.lock().await.last_activity(activity_type).cloned()
    }

    /// Take the baby's published states down
    pub fn remove_states(&self) {
        self.sensors.remove();
    }
}

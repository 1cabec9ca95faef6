//! Config entry lifecycle and the integration handle
//!
//! [`BabyCareTracker`] owns one [`EntryRuntime`] per loaded config entry:
//! the coordinator, its command queue, its trigger listener and its sensor
//! poller. Services are registered with the first loaded entry and dropped
//! with the last.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bct_config::{BabyConfig, TrackerConfig};
use bct_core::Context;
use bct_registries::{ConfigEntry, ConfigEntrySource, ConfigEntryState};
use chrono::NaiveDate;
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::action::{MappedAction, TriggerSpec};
use crate::clock::Clock;
use crate::consts::*;
use crate::coordinator::BabyCoordinator;
use crate::error::{TrackerError, TrackerResult};
use crate::hass::{Hass, SharedHass};
use crate::listener::TriggerListener;
use crate::mapping::{remove_mappings, upsert_mapping, MappingTable, Options};
use crate::sensor::BabySensors;
use crate::services::{register_services, unregister_services};
use crate::store::entry_store;
use crate::worker::CommandWorker;

/// Republishes a coordinator's sensors on a fixed interval
struct Poller {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl Poller {
    fn start(coordinator: Arc<BabyCoordinator>, period: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately and setup already published
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        coordinator.refresh(&Context::new()).await;
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            debug!(baby = %coordinator.baby_name(), "Sensor poller stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Sensor poller ended abnormally");
        }
    }
}

/// What a loaded config entry keeps alive
pub struct EntryRuntime {
    coordinator: Arc<BabyCoordinator>,
    worker: Mutex<Option<CommandWorker>>,
    listener: Mutex<Option<TriggerListener>>,
    poller: Mutex<Option<Poller>>,
}

impl EntryRuntime {
    pub fn coordinator(&self) -> &Arc<BabyCoordinator> {
        &self.coordinator
    }

    /// Swap the trigger listener for one built from `table`
    async fn resubscribe(&self, hass: &Hass, table: MappingTable) {
        let mut listener = self.listener.lock().await;
        if let Some(old) = listener.take() {
            old.stop().await;
        }
        let Some(commands) = self.worker.lock().await.as_ref().map(CommandWorker::sender) else {
            debug!("Entry is shutting down, not resubscribing");
            return;
        };
        *listener = Some(TriggerListener::start(
            hass,
            self.coordinator.baby_name(),
            table,
            commands,
        ));
    }

    /// Stop the listener and poller, then let queued commands finish
    ///
    /// Nothing publishes for the entry once this returns.
    async fn shutdown(&self) {
        if let Some(listener) = self.listener.lock().await.take() {
            listener.stop().await;
        }
        if let Some(poller) = self.poller.lock().await.take() {
            poller.stop().await;
        }
        if let Some(worker) = self.worker.lock().await.take() {
            worker.drain().await;
        }
    }
}

pub struct BabyCareTracker {
    hass: SharedHass,
    clock: Arc<dyn Clock>,
    update_interval: Duration,
    entries: DashMap<String, Arc<EntryRuntime>>,
    this: Weak<BabyCareTracker>,
}

impl BabyCareTracker {
    pub fn new(hass: SharedHass, clock: Arc<dyn Clock>) -> Arc<Self> {
        Self::with_update_interval(hass, clock, DEFAULT_UPDATE_INTERVAL)
    }

    pub fn with_update_interval(
        hass: SharedHass,
        clock: Arc<dyn Clock>,
        update_interval: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            hass,
            clock,
            update_interval,
            entries: DashMap::new(),
            this: this.clone(),
        })
    }

    pub fn hass(&self) -> &SharedHass {
        &self.hass
    }

    /// Create a config entry for a baby, as the user setup flow does
    ///
    /// An empty name falls back to the default. A second entry for the same
    /// name is refused.
    pub async fn create_entry(
        &self,
        baby_name: &str,
        birth_date: Option<NaiveDate>,
    ) -> TrackerResult<ConfigEntry> {
        let baby_name = match baby_name.trim() {
            "" => DEFAULT_NAME,
            name => name,
        };
        let entry = build_entry(baby_name, birth_date, Options::new(), ConfigEntrySource::User);
        Ok(self.hass.registries.config_entries.add(entry).await?)
    }

    /// Create config entries for YAML babies that have none yet
    ///
    /// Existing entries keep their persisted options. Returns the ids of the
    /// entries created.
    #[instrument(skip_all, fields(babies = config.babies.len()))]
    pub async fn import_yaml(&self, config: &TrackerConfig) -> TrackerResult<Vec<String>> {
        let config_entries = &self.hass.registries.config_entries;
        let mut created = Vec::new();

        for baby in &config.babies {
            if config_entries
                .get_by_unique_id(DOMAIN, &baby.baby_name)
                .is_some()
            {
                debug!(baby = %baby.baby_name, "Config entry already exists, skipping import");
                continue;
            }

            let entry = build_entry(
                &baby.baby_name,
                baby.birth_date,
                seed_options(baby),
                ConfigEntrySource::Import,
            );
            let entry = config_entries.add(entry).await?;
            info!(baby = %baby.baby_name, entry_id = %entry.entry_id, "Imported baby from YAML");
            created.push(entry.entry_id);
        }

        Ok(created)
    }

    /// Set up every config entry of the domain
    ///
    /// A failing entry is logged and left in `SetupError`; the rest still
    /// load. Returns how many are loaded afterwards.
    pub async fn setup_all(&self) -> usize {
        for entry in self.hass.registries.config_entries.get_by_domain(DOMAIN) {
            if let Err(e) = self.setup_entry(&entry.entry_id).await {
                error!(entry_id = %entry.entry_id, title = %entry.title, error = %e, "Failed to set up entry");
            }
        }
        self.entries.len()
    }

    #[instrument(skip(self))]
    pub async fn setup_entry(&self, entry_id: &str) -> TrackerResult<()> {
        if self.entries.contains_key(entry_id) {
            debug!("Entry already set up");
            return Ok(());
        }

        let config_entries = &self.hass.registries.config_entries;
        let entry = config_entries
            .get(entry_id)
            .ok_or_else(|| TrackerError::EntryNotFound(entry_id.to_string()))?;

        match self.build_runtime(&entry).await {
            Ok(runtime) => {
                self.entries.insert(entry_id.to_string(), runtime);
                config_entries.set_state(entry_id, ConfigEntryState::Loaded);
                info!(title = %entry.title, "Set up baby care tracker");
                Ok(())
            }
            Err(e) => {
                config_entries.set_state(entry_id, ConfigEntryState::SetupError);
                Err(e)
            }
        }
    }

    async fn build_runtime(&self, entry: &ConfigEntry) -> TrackerResult<Arc<EntryRuntime>> {
        let baby_name = entry.data_str(CONF_BABY_NAME).unwrap_or(DEFAULT_NAME);
        let birth_date = entry
            .data_str(CONF_BIRTH_DATE)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());

        let sensors = BabySensors::register(&self.hass, &entry.entry_id, baby_name)?;
        let coordinator = Arc::new(BabyCoordinator::new(
            entry.entry_id.clone(),
            baby_name,
            birth_date,
            entry_store(self.hass.registries.storage.clone(), &entry.entry_id),
            self.clock.clone(),
            sensors,
        ));
        coordinator.load().await?;

        if !self.hass.services.has_service(DOMAIN, SERVICE_START_FEEDING) {
            register_services(&self.hass.services, &self.this)?;
        }

        let table = MappingTable::from_options(&entry.options);
        let worker = CommandWorker::start(coordinator.clone());
        let listener =
            TriggerListener::start(&self.hass, baby_name, table, worker.sender());
        let poller = Poller::start(coordinator.clone(), self.update_interval);

        Ok(Arc::new(EntryRuntime {
            coordinator,
            worker: Mutex::new(Some(worker)),
            listener: Mutex::new(Some(listener)),
            poller: Mutex::new(Some(poller)),
        }))
    }

    /// Stop the entry's tasks and take its states down
    ///
    /// Returns `false` when the entry was not loaded.
    #[instrument(skip(self))]
    pub async fn unload_entry(&self, entry_id: &str) -> TrackerResult<bool> {
        let Some((_, runtime)) = self.entries.remove(entry_id) else {
            return Ok(false);
        };

        runtime.shutdown().await;
        runtime.coordinator.remove_states();
        self.hass
            .registries
            .config_entries
            .set_state(entry_id, ConfigEntryState::NotLoaded);

        if self.entries.is_empty() {
            let removed = unregister_services(&self.hass.services);
            debug!(removed, "Last entry unloaded, services removed");
        }

        info!(baby = %runtime.coordinator.baby_name(), "Unloaded baby care tracker");
        Ok(true)
    }

    pub async fn reload_entry(&self, entry_id: &str) -> TrackerResult<()> {
        self.unload_entry(entry_id).await?;
        self.setup_entry(entry_id).await
    }

    pub async fn unload_all(&self) {
        for entry_id in self.entry_ids() {
            if let Err(e) = self.unload_entry(&entry_id).await {
                error!(%entry_id, error = %e, "Failed to unload entry");
            }
        }
    }

    /// Unload the entry, then delete it with its stored activities, entities
    /// and device
    #[instrument(skip(self))]
    pub async fn remove_entry(&self, entry_id: &str) -> TrackerResult<()> {
        self.unload_entry(entry_id).await?;

        let registries = &self.hass.registries;
        let entry = registries.config_entries.remove(entry_id).await?;
        entry_store(registries.storage.clone(), entry_id)
            .remove()
            .await?;

        for entity in registries.entities.get_by_config_entry_id(entry_id) {
            registries.entities.remove(&entity.entity_id);
        }
        for device in registries.devices.get_by_config_entry_id(entry_id) {
            registries.devices.remove(&device.id);
        }

        info!(title = %entry.title, "Removed baby care tracker");
        Ok(())
    }

    /// Ids of the loaded entries
    pub fn entry_ids(&self) -> Vec<String> {
        self.entries.iter().map(|r| r.key().clone()).collect()
    }

    pub fn coordinator(&self, entry_id: &str) -> Option<Arc<BabyCoordinator>> {
        self.entries
            .get(entry_id)
            .map(|r| r.value().coordinator.clone())
    }

    /// Pick the baby a call is about
    ///
    /// `baby` matches an entry id or a baby name. Without it there must be
    /// exactly one loaded baby.
    pub fn resolve(&self, baby: Option<&str>) -> TrackerResult<Arc<BabyCoordinator>> {
        self.resolve_runtime(baby)
            .map(|runtime| runtime.coordinator.clone())
    }

    fn resolve_runtime(&self, baby: Option<&str>) -> TrackerResult<Arc<EntryRuntime>> {
        match baby {
            Some(selector) => self
                .entries
                .iter()
                .find(|r| r.key() == selector || r.value().coordinator.baby_name() == selector)
                .map(|r| r.value().clone())
                .ok_or_else(|| TrackerError::BabyNotFound(selector.to_string())),
            None => {
                let mut loaded = self.entries.iter();
                match (loaded.next(), loaded.next()) {
                    (Some(only), None) => Ok(only.value().clone()),
                    (None, _) => Err(TrackerError::NoBabies),
                    (Some(_), Some(_)) => Err(TrackerError::AmbiguousBaby),
                }
            }
        }
    }

    /// Bind `entity_id` (optionally a button label on it) to an action
    ///
    /// The options are persisted and the listener re-subscribed with the
    /// new table.
    #[instrument(skip(self))]
    pub async fn update_button_mapping(
        &self,
        baby: Option<&str>,
        entity_id: &str,
        trigger_action: Option<&str>,
        baby_care_action: &str,
    ) -> TrackerResult<()> {
        let action: MappedAction = baby_care_action.parse().map_err(|e| {
            error!(action = %baby_care_action, "Invalid baby care action");
            e
        })?;
        let trigger = match trigger_action.filter(|label| !label.is_empty()) {
            Some(label) => TriggerSpec::button(entity_id, label),
            None => TriggerSpec::state(entity_id),
        };

        let runtime = self.resolve_runtime(baby)?;
        let entry_id = runtime.coordinator.entry_id().to_string();
        let mut options = self.entry_options(&entry_id)?;
        upsert_mapping(&mut options, action, &trigger);

        self.apply_options(&runtime, &entry_id, options).await?;
        info!(%action, trigger = %trigger, "Updated button mapping");
        Ok(())
    }

    /// Unbind mappings of `entity_id`
    ///
    /// Returns the actions that lost their trigger. Nothing is persisted when
    /// no mapping matched.
    #[instrument(skip(self))]
    pub async fn remove_button_mapping(
        &self,
        baby: Option<&str>,
        entity_id: &str,
        specific_action: Option<&str>,
    ) -> TrackerResult<Vec<MappedAction>> {
        let runtime = self.resolve_runtime(baby)?;
        let entry_id = runtime.coordinator.entry_id().to_string();
        let mut options = self.entry_options(&entry_id)?;

        let removed = remove_mappings(&mut options, entity_id, specific_action);
        if removed.is_empty() {
            info!("No mapping found to remove");
            return Ok(removed);
        }

        self.apply_options(&runtime, &entry_id, options).await?;
        info!(removed = ?removed, "Removed button mapping");
        Ok(removed)
    }

    fn entry_options(&self, entry_id: &str) -> TrackerResult<Options> {
        self.hass
            .registries
            .config_entries
            .get(entry_id)
            .map(|entry| entry.options)
            .ok_or_else(|| TrackerError::EntryNotFound(entry_id.to_string()))
    }

    async fn apply_options(
        &self,
        runtime: &EntryRuntime,
        entry_id: &str,
        options: Options,
    ) -> TrackerResult<()> {
        let table = MappingTable::from_options(&options);
        self.hass
            .registries
            .config_entries
            .update_options(entry_id, options)
            .await?;
        runtime.resubscribe(&self.hass, table).await;
        Ok(())
    }
}

fn build_entry(
    baby_name: &str,
    birth_date: Option<NaiveDate>,
    options: Options,
    source: ConfigEntrySource,
) -> ConfigEntry {
    let mut data: HashMap<String, Value> = HashMap::new();
    data.insert(CONF_BABY_NAME.into(), json!(baby_name));
    if let Some(date) = birth_date {
        data.insert(CONF_BIRTH_DATE.into(), json!(date.format("%Y-%m-%d").to_string()));
    }

    ConfigEntry::new(DOMAIN, entry_title(baby_name))
        .with_data(data)
        .with_options(options)
        .with_unique_id(baby_name)
        .with_source(source)
}

fn seed_options(baby: &BabyConfig) -> Options {
    baby.mappings
        .iter()
        .map(|(key, spec)| (key.clone(), Value::String(spec.clone())))
        .collect()
}

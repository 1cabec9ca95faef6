//! Entity-to-action mapping table
//!
//! The table lives in the config entry options as
//! `<action>_entity -> trigger spec`, one trigger per action. It is rebuilt
//! from the options whenever they change.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::action::{MappedAction, TriggerSpec};

pub type Options = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Mapping {
    pub action: MappedAction,
    pub trigger: TriggerSpec,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingTable {
    mappings: Vec<Mapping>,
}

impl MappingTable {
    /// Read the mappings out of config entry options
    ///
    /// Unknown keys and non-string values are skipped with a warning.
    pub fn from_options(options: &Options) -> Self {
        let mut mappings = Vec::new();

        for (key, value) in options {
            let Some(action) = MappedAction::from_option_key(key) else {
                warn!(option = %key, "Ignoring unknown mapping option");
                continue;
            };
            let Some(spec) = value.as_str().filter(|s| !s.is_empty()) else {
                if !value.is_null() {
                    warn!(option = %key, "Mapping value must be a string");
                }
                continue;
            };

            let trigger = TriggerSpec::parse(spec);
            if trigger.is_button() {
                debug!(%action, trigger = %trigger, "Configured button event");
            } else {
                debug!(%action, trigger = %trigger, "Configured state change");
            }
            mappings.push(Mapping { action, trigger });
        }

        Self { mappings }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mapping> {
        self.mappings.iter()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn has_state_triggers(&self) -> bool {
        self.mappings.iter().any(|m| !m.trigger.is_button())
    }

    pub fn has_button_triggers(&self) -> bool {
        self.mappings.iter().any(|m| m.trigger.is_button())
    }

    /// Action bound to state changes of `entity_id`
    ///
    /// When several actions name the same entity the later option wins.
    pub fn state_action(&self, entity_id: &str) -> Option<MappedAction> {
        self.mappings
            .iter()
            .rev()
            .find(|m| !m.trigger.is_button() && m.trigger.entity_id == entity_id)
            .map(|m| m.action)
    }

    /// Labeled triggers configured for `entity_id`
    pub fn button_mappings<'a>(&'a self, entity_id: &'a str) -> impl Iterator<Item = &'a Mapping> {
        self.mappings
            .iter()
            .filter(move |m| m.trigger.is_button() && m.trigger.entity_id == entity_id)
    }
}

/// Bind `action` to `trigger`
///
/// Any other action holding the exact same trigger loses it, so a trigger
/// spec maps to one action only.
pub fn upsert_mapping(options: &mut Options, action: MappedAction, trigger: &TriggerSpec) {
    let spec = trigger.to_string();

    let stale: Vec<String> = options
        .iter()
        .filter(|(key, value)| {
            key.as_str() != action.option_key()
                && MappedAction::from_option_key(key).is_some()
                && value.as_str() == Some(spec.as_str())
        })
        .map(|(key, _)| key.clone())
        .collect();
    for key in stale {
        debug!(option = %key, trigger = %spec, "Moving trigger to another action");
        options.shift_remove(&key);
    }

    options.shift_remove(action.option_key());
    options.insert(action.option_key().to_string(), Value::String(spec));
}

/// Drop mappings of `entity_id`
///
/// Without `specific_action` every mapping of the entity goes, labeled or
/// not. With it only the labeled mapping whose label equals it goes.
/// Returns the actions that were unbound.
pub fn remove_mappings(
    options: &mut Options,
    entity_id: &str,
    specific_action: Option<&str>,
) -> Vec<MappedAction> {
    let doomed: Vec<(String, MappedAction)> = options
        .iter()
        .filter_map(|(key, value)| {
            let action = MappedAction::from_option_key(key)?;
            let trigger = TriggerSpec::parse(value.as_str()?);
            if trigger.entity_id != entity_id {
                return None;
            }
            let matches = match specific_action {
                None => true,
                Some(label) => trigger.label.as_deref() == Some(label),
            };
            matches.then(|| (key.clone(), action))
        })
        .collect();

    doomed
        .into_iter()
        .map(|(key, action)| {
            options.shift_remove(&key);
            action
        })
        .collect()
}

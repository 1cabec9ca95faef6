//! Matching incoming events against the mapping table
//!
//! Pure decisions only; the listener task acts on the results.

use bct_core::domains::TriggerStyle;
use bct_core::State;
use bct_registries::EntityRegistry;
use serde_json::Value;

use crate::action::MappedAction;
use crate::mapping::MappingTable;

/// Whether a state transition counts as a press for the entity's domain
///
/// Removals (no new state) never fire.
pub fn should_trigger(old_state: Option<&State>, new_state: Option<&State>) -> bool {
    let Some(new_state) = new_state else {
        return false;
    };

    match TriggerStyle::for_domain(new_state.domain()) {
        TriggerStyle::Press => true,
        TriggerStyle::RisingEdge => {
            matches!(old_state, Some(old) if !old.is_on()) && new_state.is_on()
        }
        TriggerStyle::ValueChange => {
            matches!(old_state, Some(old) if old.state != new_state.state)
        }
    }
}

/// A discrete press read out of a `zha_event` or `deconz_event`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonPress {
    pub device_id: String,
    pub command: String,
}

impl ButtonPress {
    /// ZHA reports `command`; deCONZ reports a numeric `event` code
    pub fn from_event_data(data: &Value) -> Option<Self> {
        let device_id = data.get("device_id")?.as_str()?.to_string();
        let command = match data.get("command").or_else(|| data.get("event"))? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };

        if device_id.is_empty() || command.is_empty() {
            return None;
        }
        Some(Self { device_id, command })
    }
}

/// Outcome of matching one press
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonMatch {
    Matched {
        entity_id: String,
        action: MappedAction,
    },
    /// The device has no entities in the registry
    UnknownDevice,
    /// The device is known but none of its entities are mapped
    NotMapped,
    /// A mapped entity of the device was pressed with another label
    LabelMismatch {
        entity_id: String,
        configured: Vec<String>,
        received: String,
    },
}

/// Resolve the press's device to entities and find the first labeled mapping
/// whose label equals the pressed command
pub fn match_button_press(
    press: &ButtonPress,
    entities: &EntityRegistry,
    table: &MappingTable,
) -> ButtonMatch {
    let device_entities = entities.get_by_device_id(&press.device_id);
    if device_entities.is_empty() {
        return ButtonMatch::UnknownDevice;
    }

    let mut mismatch = None;
    for entry in &device_entities {
        let mut configured = Vec::new();
        for mapping in table.button_mappings(&entry.entity_id) {
            if mapping.trigger.label.as_deref() == Some(press.command.as_str()) {
                return ButtonMatch::Matched {
                    entity_id: entry.entity_id.clone(),
                    action: mapping.action,
                };
            }
            configured.extend(mapping.trigger.label.clone());
        }

        if mismatch.is_none() && !configured.is_empty() {
            mismatch = Some(ButtonMatch::LabelMismatch {
                entity_id: entry.entity_id.clone(),
                configured,
                received: press.command.clone(),
            });
        }
    }

    mismatch.unwrap_or(ButtonMatch::NotMapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::TriggerSpec;
    use crate::mapping::{upsert_mapping, Options};
    use bct_core::{Context, EntityId};
    use bct_registries::Storage;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn state(entity_id: &str, value: &str) -> State {
        let id: EntityId = entity_id.parse().unwrap();
        State::new(id, value, HashMap::new(), Context::new())
    }

    #[test]
    fn test_switch_fires_on_rising_edge_only() {
        let off = state("switch.a", "off");
        let on = state("switch.a", "on");

        assert!(should_trigger(Some(&off), Some(&on)));
        assert!(!should_trigger(Some(&on), Some(&on)));
        assert!(!should_trigger(Some(&on), Some(&off)));
        assert!(!should_trigger(None, Some(&on)));
        assert!(!should_trigger(Some(&off), None));
    }

    #[test]
    fn test_button_fires_on_every_write() {
        let first = state("input_button.feed", "2025-08-01T10:00:00");
        assert!(should_trigger(None, Some(&first)));
        assert!(should_trigger(Some(&first), Some(&first)));
    }

    #[test]
    fn test_other_domains_fire_on_value_change() {
        let single = state("sensor.remote_action", "single");
        let idle = state("sensor.remote_action", "");
        assert!(should_trigger(Some(&idle), Some(&single)));
        assert!(!should_trigger(Some(&single), Some(&single)));
        assert!(!should_trigger(None, Some(&single)));
    }

    #[test]
    fn test_press_from_zha_and_deconz() {
        let zha = ButtonPress::from_event_data(&json!({
            "device_id": "dev1", "command": "on", "args": []
        }))
        .unwrap();
        assert_eq!(zha.command, "on");

        let deconz = ButtonPress::from_event_data(&json!({
            "device_id": "dev2", "event": 1002
        }))
        .unwrap();
        assert_eq!(deconz.command, "1002");

        assert!(ButtonPress::from_event_data(&json!({"command": "on"})).is_none());
        assert!(ButtonPress::from_event_data(&json!({"device_id": "d", "command": ""})).is_none());
    }

    #[test]
    fn test_match_button_press_outcomes() {
        let dir = TempDir::new().unwrap();
        let entities = EntityRegistry::new(Arc::new(Storage::new(dir.path())));
        entities.get_or_create("zha", "sensor.remote_action", Some("r1"), None, Some("dev1"));
        entities.get_or_create("zha", "sensor.lamp_power", Some("l1"), None, Some("dev2"));

        let mut opts = Options::new();
        upsert_mapping(
            &mut opts,
            MappedAction::DiaperPee,
            &TriggerSpec::button("sensor.remote_action", "single"),
        );
        upsert_mapping(
            &mut opts,
            MappedAction::DiaperPoo,
            &TriggerSpec::button("sensor.remote_action", "double"),
        );
        let table = MappingTable::from_options(&opts);

        let press = |device: &str, command: &str| ButtonPress {
            device_id: device.to_string(),
            command: command.to_string(),
        };

        assert_eq!(
            match_button_press(&press("dev1", "double"), &entities, &table),
            ButtonMatch::Matched {
                entity_id: "sensor.remote_action".into(),
                action: MappedAction::DiaperPoo,
            }
        );
        assert_eq!(
            match_button_press(&press("dev1", "hold"), &entities, &table),
            ButtonMatch::LabelMismatch {
                entity_id: "sensor.remote_action".into(),
                configured: vec!["single".into(), "double".into()],
                received: "hold".into(),
            }
        );
        assert_eq!(
            match_button_press(&press("dev2", "on"), &entities, &table),
            ButtonMatch::NotMapped
        );
        assert_eq!(
            match_button_press(&press("dev9", "on"), &entities, &table),
            ButtonMatch::UnknownDevice
        );
    }
}

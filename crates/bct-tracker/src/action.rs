//! Commands and the actions an entity can be mapped to

use std::fmt;
use std::str::FromStr;

use crate::activity::{DiaperType, FeedingSide};
use crate::error::TrackerError;

/// A tracker operation with its parameters
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartFeeding { side: FeedingSide },
    StopFeeding,
    StartSleep,
    WakeUp,
    LogDiaper { diaper_type: DiaperType },
    LogBottleFeeding { amount_ml: i64 },
    LogGrowth {
        weight_kg: Option<f64>,
        height_cm: Option<f64>,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartFeeding { .. } => "start_feeding",
            Self::StopFeeding => "stop_feeding",
            Self::StartSleep => "sleep_start",
            Self::WakeUp => "wake_up",
            Self::LogDiaper { .. } => "log_diaper",
            Self::LogBottleFeeding { .. } => "log_bottle_feeding",
            Self::LogGrowth { .. } => "log_growth",
        }
    }
}

/// Targets a physical trigger can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappedAction {
    FeedingStartLeft,
    FeedingStartRight,
    FeedingStop,
    SleepStart,
    WakeUp,
    DiaperPee,
    DiaperPoo,
    DiaperBoth,
}

impl MappedAction {
    pub const ALL: [MappedAction; 8] = [
        Self::FeedingStartLeft,
        Self::FeedingStartRight,
        Self::FeedingStop,
        Self::SleepStart,
        Self::WakeUp,
        Self::DiaperPee,
        Self::DiaperPoo,
        Self::DiaperBoth,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::FeedingStartLeft => "feeding_start_left",
            Self::FeedingStartRight => "feeding_start_right",
            Self::FeedingStop => "feeding_stop",
            Self::SleepStart => "sleep_start",
            Self::WakeUp => "wake_up",
            Self::DiaperPee => "diaper_pee",
            Self::DiaperPoo => "diaper_poo",
            Self::DiaperBoth => "diaper_both",
        }
    }

    /// Config entry option holding this action's trigger
    pub fn option_key(&self) -> &'static str {
        match self {
            Self::FeedingStartLeft => "feeding_start_left_entity",
            Self::FeedingStartRight => "feeding_start_right_entity",
            Self::FeedingStop => "feeding_stop_entity",
            Self::SleepStart => "sleep_start_entity",
            Self::WakeUp => "wake_up_entity",
            Self::DiaperPee => "diaper_pee_entity",
            Self::DiaperPoo => "diaper_poo_entity",
            Self::DiaperBoth => "diaper_both_entity",
        }
    }

    pub fn from_option_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.option_key() == key)
    }

    pub fn command(&self) -> Command {
        match self {
            Self::FeedingStartLeft => Command::StartFeeding {
                side: FeedingSide::Left,
            },
            Self::FeedingStartRight => Command::StartFeeding {
                side: FeedingSide::Right,
            },
            Self::FeedingStop => Command::StopFeeding,
            Self::SleepStart => Command::StartSleep,
            Self::WakeUp => Command::WakeUp,
            Self::DiaperPee => Command::LogDiaper {
                diaper_type: DiaperType::Pee,
            },
            Self::DiaperPoo => Command::LogDiaper {
                diaper_type: DiaperType::Poo,
            },
            Self::DiaperBoth => Command::LogDiaper {
                diaper_type: DiaperType::Both,
            },
        }
    }
}

impl fmt::Display for MappedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MappedAction {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| TrackerError::UnknownAction(s.to_string()))
    }
}

/// `entity_id` or `entity_id:action_label`
///
/// A spec with a label matches discrete button presses reported by the
/// device behind the entity. A spec without one matches state changes of
/// the entity itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriggerSpec {
    pub entity_id: String,
    pub label: Option<String>,
}

impl TriggerSpec {
    pub fn state(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            label: None,
        }
    }

    pub fn button(entity_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            label: Some(label.into()),
        }
    }

    /// Split on the first colon; everything after it is the label
    pub fn parse(spec: &str) -> Self {
        match spec.split_once(':') {
            Some((entity_id, label)) => Self::button(entity_id, label),
            None => Self::state(spec),
        }
    }

    pub fn is_button(&self) -> bool {
        self.label.is_some()
    }
}

impl fmt::Display for TriggerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{}:{}", self.entity_id, label),
            None => f.write_str(&self.entity_id),
        }
    }
}

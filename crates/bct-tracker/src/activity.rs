//! Activity records
//!
//! A record is written once when an activity completes and is never changed
//! afterwards. On disk each record is a flat JSON object tagged by `type`:
//!
//! ```json
//! {"type": "feeding", "side": "left", "start_time": "2025-08-01T10:00:00",
//!  "end_time": "2025-08-01T10:10:00", "duration_seconds": 600.0,
//!  "timestamp": "2025-08-01T10:10:00", "notes": ""}
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedingSide {
    Left,
    Right,
}

impl FeedingSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for FeedingSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedingSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(format!("unknown feeding side '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiaperType {
    Pee,
    Poo,
    Both,
}

impl DiaperType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pee => "pee",
            Self::Poo => "poo",
            Self::Both => "both",
        }
    }

    pub fn has_pee(&self) -> bool {
        matches!(self, Self::Pee | Self::Both)
    }

    pub fn has_poo(&self) -> bool {
        matches!(self, Self::Poo | Self::Both)
    }
}

impl fmt::Display for DiaperType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiaperType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pee" => Ok(Self::Pee),
            "poo" => Ok(Self::Poo),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown diaper type '{}'", other)),
        }
    }
}

/// Kind of an activity, used to filter the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityType {
    Feeding,
    Sleeping,
    Diaper,
    BottleFeeding,
    Growth,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feeding => "feeding",
            Self::Sleeping => "sleeping",
            Self::Diaper => "diaper",
            Self::BottleFeeding => "bottle_feeding",
            Self::Growth => "growth",
        }
    }
}

/// Kind-specific payload of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityKind {
    Feeding {
        side: FeedingSide,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
        duration_seconds: f64,
    },
    Sleeping {
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
        duration_seconds: f64,
    },
    Diaper {
        diaper_type: DiaperType,
    },
    BottleFeeding {
        amount_ml: i64,
    },
    Growth {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        weight_kg: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height_cm: Option<f64>,
    },
}

impl ActivityKind {
    pub fn activity_type(&self) -> ActivityType {
        match self {
            Self::Feeding { .. } => ActivityType::Feeding,
            Self::Sleeping { .. } => ActivityType::Sleeping,
            Self::Diaper { .. } => ActivityType::Diaper,
            Self::BottleFeeding { .. } => ActivityType::BottleFeeding,
            Self::Growth { .. } => ActivityType::Growth,
        }
    }
}

/// A completed activity in the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// When the record was written (the end time for sessions)
    pub timestamp: NaiveDateTime,

    #[serde(default)]
    pub notes: String,

    #[serde(flatten)]
    pub kind: ActivityKind,
}

impl ActivityRecord {
    pub fn new(timestamp: NaiveDateTime, notes: impl Into<String>, kind: ActivityKind) -> Self {
        Self {
            timestamp,
            notes: notes.into(),
            kind,
        }
    }

    pub fn activity_type(&self) -> ActivityType {
        self.kind.activity_type()
    }

    pub fn is(&self, activity_type: ActivityType) -> bool {
        self.activity_type() == activity_type
    }

    /// Session length, for feeding and sleeping records
    pub fn duration_seconds(&self) -> Option<f64> {
        match self.kind {
            ActivityKind::Feeding {
                duration_seconds, ..
            }
            | ActivityKind::Sleeping {
                duration_seconds, ..
            } => Some(duration_seconds),
            _ => None,
        }
    }

    pub fn side(&self) -> Option<FeedingSide> {
        match self.kind {
            ActivityKind::Feeding { side, .. } => Some(side),
            _ => None,
        }
    }

    pub fn diaper_type(&self) -> Option<DiaperType> {
        match self.kind {
            ActivityKind::Diaper { diaper_type } => Some(diaper_type),
            _ => None,
        }
    }

    pub fn start_time(&self) -> Option<NaiveDateTime> {
        match self.kind {
            ActivityKind::Feeding { start_time, .. } | ActivityKind::Sleeping { start_time, .. } => {
                Some(start_time)
            }
            _ => None,
        }
    }

    pub fn end_time(&self) -> Option<NaiveDateTime> {
        match self.kind {
            ActivityKind::Feeding { end_time, .. } | ActivityKind::Sleeping { end_time, .. } => {
                Some(end_time)
            }
            _ => None,
        }
    }
}

/// Seconds between two local times, to the millisecond
pub fn seconds_between(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0
}

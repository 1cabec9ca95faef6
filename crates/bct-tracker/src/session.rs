//! Activity log and open sessions for one baby
//!
//! Feeding and sleeping are each a two-state machine (idle or active).
//! Starting a session while one of the same kind is open closes the old one
//! first, inside the same call, so two open sessions of one kind are never
//! observable. Diaper, bottle and growth entries have no session and are
//! appended directly.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::activity::{seconds_between, ActivityKind, ActivityRecord, ActivityType, FeedingSide};
use crate::consts::{NOTE_NEW_SLEEP, NOTE_SWITCHING_SIDES};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedingSession {
    pub side: FeedingSide,
    pub start_time: NaiveDateTime,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepSession {
    pub start_time: NaiveDateTime,
    #[serde(default)]
    pub notes: String,
}

/// The persisted document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerData {
    #[serde(default)]
    pub activities: Vec<ActivityRecord>,

    #[serde(default)]
    pub current_feeding: Option<FeedingSession>,

    #[serde(default)]
    pub current_sleep: Option<SleepSession>,
}

/// What a start transition did
#[derive(Debug, Clone, PartialEq)]
pub struct Started {
    /// Record appended for a session that had to be closed first
    pub closed: Option<ActivityRecord>,
}

fn join_notes(open: &str, close: &str) -> String {
    format!("{} {}", open, close).trim().to_string()
}

impl TrackerData {
    pub fn is_feeding(&self) -> bool {
        self.current_feeding.is_some()
    }

    pub fn is_sleeping(&self) -> bool {
        self.current_sleep.is_some()
    }

    pub fn start_feeding(&mut self, side: FeedingSide, notes: &str, now: NaiveDateTime) -> Started {
        let closed = if self.current_feeding.is_some() {
            self.stop_feeding(NOTE_SWITCHING_SIDES, now)
        } else {
            None
        };

        self.current_feeding = Some(FeedingSession {
            side,
            start_time: now,
            notes: notes.to_string(),
        });
        info!(%side, "Started feeding");

        Started { closed }
    }

    /// Close the open feeding; `None` when there was nothing to close
    pub fn stop_feeding(&mut self, notes: &str, now: NaiveDateTime) -> Option<ActivityRecord> {
        let Some(session) = self.current_feeding.take() else {
            warn!("No active feeding session to stop");
            return None;
        };

        let duration_seconds = seconds_between(session.start_time, now);
        let record = ActivityRecord::new(
            now,
            join_notes(&session.notes, notes),
            ActivityKind::Feeding {
                side: session.side,
                start_time: session.start_time,
                end_time: now,
                duration_seconds,
            },
        );
        self.activities.push(record.clone());

        info!(
            side = %session.side,
            minutes = duration_seconds / 60.0,
            "Stopped feeding session"
        );
        Some(record)
    }

    pub fn start_sleep(&mut self, notes: &str, now: NaiveDateTime) -> Started {
        let closed = if self.current_sleep.is_some() {
            self.wake_up(NOTE_NEW_SLEEP, now)
        } else {
            None
        };

        self.current_sleep = Some(SleepSession {
            start_time: now,
            notes: notes.to_string(),
        });
        info!("Started sleep session");

        Started { closed }
    }

    /// Close the open sleep; `None` when there was nothing to close
    pub fn wake_up(&mut self, notes: &str, now: NaiveDateTime) -> Option<ActivityRecord> {
        let Some(session) = self.current_sleep.take() else {
            warn!("No active sleep session to end");
            return None;
        };

        let duration_seconds = seconds_between(session.start_time, now);
        let record = ActivityRecord::new(
            now,
            join_notes(&session.notes, notes),
            ActivityKind::Sleeping {
                start_time: session.start_time,
                end_time: now,
                duration_seconds,
            },
        );
        self.activities.push(record.clone());

        info!(
            hours = duration_seconds / 3600.0,
            "Ended sleep session"
        );
        Some(record)
    }

    /// Append a record that has no session
    pub fn log(&mut self, kind: ActivityKind, notes: &str, now: NaiveDateTime) -> ActivityRecord {
        let record = ActivityRecord::new(now, notes, kind);
        self.activities.push(record.clone());
        info!(activity = record.activity_type().as_str(), "Logged activity");
        record
    }

    /// Records of one kind whose timestamp falls on `date`
    pub fn daily_activities(&self, activity_type: ActivityType, date: NaiveDate) -> Vec<&ActivityRecord> {
        self.activities
            .iter()
            .filter(|a| a.is(activity_type) && a.timestamp.date() == date)
            .collect()
    }

    /// The record of one kind with the latest timestamp
    pub fn last_activity(&self, activity_type: ActivityType) -> Option<&ActivityRecord> {
        self.activities
            .iter()
            .filter(|a| a.is(activity_type))
            .max_by_key(|a| a.timestamp)
    }
}

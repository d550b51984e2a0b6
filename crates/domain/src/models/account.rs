//! Scanner account domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::geometry::Waypoint;

/// A game account a device can scan with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub level: u8,
    pub spin_count: u32,
    pub last_encounter_lat: Option<f64>,
    pub last_encounter_lon: Option<f64>,
    pub last_encounter_time: Option<DateTime<Utc>>,
    /// Non-empty when the account is banned/warned and must not be handed out.
    pub failure: Option<String>,
}

impl Account {
    pub fn new(id: impl Into<String>, level: u8) -> Self {
        Self {
            id: id.into(),
            level,
            spin_count: 0,
            last_encounter_lat: None,
            last_encounter_lon: None,
            last_encounter_time: None,
            failure: None,
        }
    }

    /// The last encounter location and time, when both are known.
    pub fn last_encounter(&self) -> Option<(Waypoint, DateTime<Utc>)> {
        match (
            self.last_encounter_lat,
            self.last_encounter_lon,
            self.last_encounter_time,
        ) {
            (Some(lat), Some(lon), Some(time)) => Some((Waypoint::new(lat, lon), time)),
            _ => None,
        }
    }

    pub fn is_usable(&self, min_level: u8, max_level: u8) -> bool {
        self.failure.is_none() && self.level >= min_level && self.level <= max_level
    }
}

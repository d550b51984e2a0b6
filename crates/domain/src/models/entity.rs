//! Location-tagged game-world entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::geometry::Waypoint;

/// An entity observed somewhere on the map.
///
/// One shape serves both controller families: sweep instances treat these
/// as stop-like targets (`daily_done` is the per-day completion marker),
/// priority instances as encounter candidates (`resolved` flips once the
/// detailed scan came back).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapEntity {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    /// Kind identifier; doubles as the priority-rank key.
    pub kind: u32,
    pub enabled: bool,
    /// Per-day completion marker, cleared by the daily reset.
    pub daily_done: bool,
    /// Whether detailed scan data (e.g. quality/IV) is already known.
    pub resolved: bool,
    pub first_seen: DateTime<Utc>,
}

impl MapEntity {
    pub fn new(id: impl Into<String>, lat: f64, lon: f64, kind: u32) -> Self {
        Self {
            id: id.into(),
            lat,
            lon,
            kind,
            enabled: true,
            daily_done: false,
            resolved: false,
            first_seen: Utc::now(),
        }
    }

    pub fn waypoint(&self) -> Waypoint {
        Waypoint::new(self.lat, self.lon)
    }

    /// Age since first observation, in seconds. Never negative.
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.first_seen).num_seconds().max(0)
    }
}

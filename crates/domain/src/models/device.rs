//! Device domain model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A remote scanning device polling for work.
///
/// The bound instance name is owned by the binding component; controllers
/// only ever read device records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub uuid: Uuid,
    pub instance_name: Option<String>,
    pub account_id: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub last_lat: Option<f64>,
    pub last_lon: Option<f64>,
}

impl Device {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            instance_name: None,
            account_id: None,
            last_seen: Utc::now(),
            last_lat: None,
            last_lon: None,
        }
    }

    /// Whether the device reported within the given liveness window.
    pub fn is_live(&self, now: DateTime<Utc>, window_secs: i64) -> bool {
        now - self.last_seen <= Duration::seconds(window_secs)
    }
}

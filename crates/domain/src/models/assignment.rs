//! Assignment domain model.
//!
//! An assignment re-binds a device to an instance, gated either by a
//! time-of-day trigger (optionally on an exact calendar date) or by another
//! instance's completion signal. Time-based triggers recur daily.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A device-to-instance reassignment rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: i64,
    /// Target device. `None` means the rule applies to every device bound
    /// to the source instance when it completes.
    pub device_uuid: Option<Uuid>,
    pub instance_name: String,
    /// Fire when this other instance signals completion.
    pub source_instance_name: Option<String>,
    /// Trigger time in seconds since local midnight; 0 means
    /// completion-triggered instead of clock-triggered.
    pub time: u32,
    /// Exact calendar date gate; `None` fires every day.
    pub date: Option<NaiveDate>,
    pub enabled: bool,
}

impl Assignment {
    pub fn is_completion_triggered(&self) -> bool {
        self.time == 0
    }

    /// Uniqueness key: (device, target instance, time, date).
    pub fn key(&self) -> (Option<Uuid>, &str, u32, Option<NaiveDate>) {
        (self.device_uuid, self.instance_name.as_str(), self.time, self.date)
    }
}

/// Request payload for creating an assignment.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssignmentRequest {
    pub device_uuid: Option<Uuid>,

    #[validate(length(min = 1, max = 100, message = "Instance name must be 1-100 characters"))]
    pub instance_name: String,

    pub source_instance_name: Option<String>,

    #[validate(custom(function = "shared::validation::validate_trigger_time"))]
    #[serde(default)]
    pub time: u32,

    pub date: Option<NaiveDate>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

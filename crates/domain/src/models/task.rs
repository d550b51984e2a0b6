//! Task returned to a polling device.

use serde::{Deserialize, Serialize};

/// What the device should do at the returned coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskAction {
    #[serde(rename = "patrol-scan-raid")]
    ScanRaid,
    #[serde(rename = "patrol-scan-pokemon")]
    ScanPokemon,
    #[serde(rename = "sweep-scan-quest")]
    ScanQuest,
    #[serde(rename = "sweep-scan-bootstrap")]
    ScanBootstrap,
    #[serde(rename = "priority-scan-iv")]
    ScanIv,
    #[serde(rename = "switch-account")]
    SwitchAccount,
}

impl TaskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskAction::ScanRaid => "patrol-scan-raid",
            TaskAction::ScanPokemon => "patrol-scan-pokemon",
            TaskAction::ScanQuest => "sweep-scan-quest",
            TaskAction::ScanBootstrap => "sweep-scan-bootstrap",
            TaskAction::ScanIv => "priority-scan-iv",
            TaskAction::SwitchAccount => "switch-account",
        }
    }
}

/// One unit of work handed to a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub instance_name: String,
    pub action: TaskAction,
    pub lat: f64,
    pub lon: f64,
    /// Seconds the device should wait before scanning (encounter cooldown).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_secs: Option<u32>,
    pub min_level: u8,
    pub max_level: u8,
}

impl Task {
    pub fn scan(
        instance_name: impl Into<String>,
        action: TaskAction,
        lat: f64,
        lon: f64,
        min_level: u8,
        max_level: u8,
    ) -> Self {
        Self {
            instance_name: instance_name.into(),
            action,
            lat,
            lon,
            delay_secs: None,
            min_level,
            max_level,
        }
    }

    /// Directive telling the device to fetch a fresh account and retry.
    pub fn switch_account(instance_name: impl Into<String>, min_level: u8, max_level: u8) -> Self {
        Self {
            instance_name: instance_name.into(),
            action: TaskAction::SwitchAccount,
            lat: 0.0,
            lon: 0.0,
            delay_secs: None,
            min_level,
            max_level,
        }
    }

    pub fn with_delay(mut self, delay_secs: u32) -> Self {
        self.delay_secs = Some(delay_secs);
        self
    }
}

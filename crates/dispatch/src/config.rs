//! Dispatch core configuration.

use serde::Deserialize;

/// Process-wide tunables for the dispatch core.
///
/// All fields have sensible defaults; deployments override only what they
/// need. Per-instance knobs (spin limit, queue capacity, timezone offset)
/// live on the instance record instead.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Assignment scheduler tick period.
    #[serde(default = "default_scheduler_tick_secs")]
    pub scheduler_tick_secs: u64,

    /// UTC offset used by the assignment scheduler's local clock.
    #[serde(default)]
    pub scheduler_tz_offset_secs: i32,

    /// Age at which a queued priority entity is discarded unserved.
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: i64,

    /// Wait before a dispatched priority entity is re-checked for a result.
    #[serde(default = "default_redispatch_check_secs")]
    pub redispatch_check_secs: i64,

    /// Tick period of the priority re-check loop.
    #[serde(default = "default_recheck_tick_secs")]
    pub recheck_tick_secs: u64,

    /// Attempts per sweep target before it is dropped for the day.
    #[serde(default = "default_max_sweep_retries")]
    pub max_sweep_retries: u32,

    /// Probability of running the patrol spacing check on a poll.
    #[serde(default = "default_hold_probability")]
    pub hold_probability: f64,

    /// Window within which a device counts as live for spacing purposes.
    #[serde(default = "default_device_live_window_secs")]
    pub device_live_window_secs: i64,

    /// Geodesic cell subdivision level for sweep bootstrap.
    #[serde(default = "default_bootstrap_cell_level")]
    pub bootstrap_cell_level: u8,

    /// Upper bound on bootstrap covering size per instance.
    #[serde(default = "default_bootstrap_max_cells")]
    pub bootstrap_max_cells: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            scheduler_tick_secs: default_scheduler_tick_secs(),
            scheduler_tz_offset_secs: 0,
            staleness_secs: default_staleness_secs(),
            redispatch_check_secs: default_redispatch_check_secs(),
            recheck_tick_secs: default_recheck_tick_secs(),
            max_sweep_retries: default_max_sweep_retries(),
            hold_probability: default_hold_probability(),
            device_live_window_secs: default_device_live_window_secs(),
            bootstrap_cell_level: default_bootstrap_cell_level(),
            bootstrap_max_cells: default_bootstrap_max_cells(),
        }
    }
}

fn default_scheduler_tick_secs() -> u64 {
    5
}
fn default_staleness_secs() -> i64 {
    600
}
fn default_redispatch_check_secs() -> i64 {
    120
}
fn default_recheck_tick_secs() -> u64 {
    1
}
fn default_max_sweep_retries() -> u32 {
    5
}
fn default_hold_probability() -> f64 {
    0.05
}
fn default_device_live_window_secs() -> i64 {
    60
}
fn default_bootstrap_cell_level() -> u8 {
    15
}
fn default_bootstrap_max_cells() -> usize {
    100_000
}

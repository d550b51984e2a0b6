//! Assignment scheduler.
//!
//! Holds the assignment rules and reconciles them against the clock on a
//! fixed tick. A watermark of "seconds since local midnight" separates
//! already-considered trigger times from pending ones, so each time-based
//! assignment fires at most once per day. Completion-triggered rules (time
//! zero) fire only through the [`CompletionSink`] signal raised by sweep
//! instances.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{Assignment, CreateAssignmentRequest};
use domain::services::boundary::{CompletionSink, DeviceDirectory};
use shared::localtime::{local_date, seconds_since_midnight};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::binding::BindingTable;
use crate::error::{DispatchError, Result};
use crate::jobs::{Job, Schedule};

/// Watermark sentinel: consider every trigger time pending.
const EVALUATE_ALL: i64 = -1;

struct SchedulerState {
    assignments: Vec<Assignment>,
    next_id: i64,
    /// Seconds-since-midnight of the last tick, or `None` before the
    /// first tick ever.
    watermark: Option<i64>,
}

pub struct AssignmentScheduler {
    devices: Arc<dyn DeviceDirectory>,
    binding: Arc<BindingTable>,
    tz_offset_secs: i32,
    state: Mutex<SchedulerState>,
}

impl AssignmentScheduler {
    pub fn new(
        devices: Arc<dyn DeviceDirectory>,
        binding: Arc<BindingTable>,
        tz_offset_secs: i32,
    ) -> Self {
        Self {
            devices,
            binding,
            tz_offset_secs,
            state: Mutex::new(SchedulerState {
                assignments: Vec::new(),
                next_id: 1,
                watermark: None,
            }),
        }
    }

    pub async fn create(&self, request: CreateAssignmentRequest) -> Result<Assignment> {
        let mut state = self.state.lock().await;
        let assignment = Assignment {
            id: state.next_id,
            device_uuid: request.device_uuid,
            instance_name: request.instance_name,
            source_instance_name: request.source_instance_name,
            time: request.time,
            date: request.date,
            enabled: request.enabled,
        };
        if state.assignments.iter().any(|a| a.key() == assignment.key()) {
            return Err(DispatchError::Conflict(format!(
                "assignment for instance {} at time {} already exists",
                assignment.instance_name, assignment.time
            )));
        }
        state.next_id += 1;
        state.assignments.push(assignment.clone());
        Ok(assignment)
    }

    pub async fn update(&self, id: i64, request: CreateAssignmentRequest) -> Result<Assignment> {
        let mut state = self.state.lock().await;
        let updated = Assignment {
            id,
            device_uuid: request.device_uuid,
            instance_name: request.instance_name,
            source_instance_name: request.source_instance_name,
            time: request.time,
            date: request.date,
            enabled: request.enabled,
        };
        if state
            .assignments
            .iter()
            .any(|a| a.id != id && a.key() == updated.key())
        {
            return Err(DispatchError::Conflict(format!(
                "assignment for instance {} at time {} already exists",
                updated.instance_name, updated.time
            )));
        }
        let slot = state
            .assignments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| DispatchError::NotFound(format!("assignment {id}")))?;
        *slot = updated.clone();
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        let index = state
            .assignments
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| DispatchError::NotFound(format!("assignment {id}")))?;
        state.assignments.remove(index);
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Option<Assignment> {
        self.state
            .lock()
            .await
            .assignments
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }

    pub async fn list(&self) -> Vec<Assignment> {
        self.state.lock().await.assignments.clone()
    }

    /// One scheduler tick at the given wall-clock instant.
    ///
    /// The very first tick only records the watermark, so triggers that
    /// elapsed before startup do not fire retroactively. A watermark ahead
    /// of the clock means midnight passed; the sentinel re-opens the whole
    /// day for evaluation.
    pub async fn tick(&self, now: DateTime<Utc>) {
        let now_secs = seconds_since_midnight(now, self.tz_offset_secs);
        let today = local_date(now, self.tz_offset_secs);

        let due: Vec<Assignment> = {
            let mut state = self.state.lock().await;
            let watermark = match state.watermark {
                Some(watermark) if watermark > now_secs => EVALUATE_ALL,
                Some(watermark) => watermark,
                None => {
                    state.watermark = Some(now_secs);
                    return;
                }
            };
            state.watermark = Some(now_secs);
            state
                .assignments
                .iter()
                .filter(|a| {
                    a.enabled
                        && !a.is_completion_triggered()
                        && watermark < a.time as i64
                        && a.time as i64 <= now_secs
                        && a.date.map_or(true, |date| date == today)
                })
                .cloned()
                .collect()
        };

        for assignment in due {
            if let Err(e) = self.fire(&assignment).await {
                warn!(
                    assignment = assignment.id,
                    instance = %assignment.instance_name,
                    error = %e,
                    "Assignment skipped this tick"
                );
            }
        }
    }

    /// Re-evaluate today's already-due assignments for unbound devices.
    /// Used after an instance removal orphans its devices.
    pub async fn evaluate_now(&self, now: DateTime<Utc>) {
        let now_secs = seconds_since_midnight(now, self.tz_offset_secs);
        let today = local_date(now, self.tz_offset_secs);

        let due: Vec<Assignment> = {
            let state = self.state.lock().await;
            state
                .assignments
                .iter()
                .filter(|a| {
                    a.enabled
                        && !a.is_completion_triggered()
                        && a.time as i64 <= now_secs
                        && a.date.map_or(true, |date| date == today)
                })
                .cloned()
                .collect()
        };

        for assignment in due {
            let device = match assignment.device_uuid {
                Some(device) => device,
                None => continue,
            };
            if self.binding.instance_of(device).await.is_some() {
                continue;
            }
            if let Err(e) = self.fire(&assignment).await {
                warn!(
                    assignment = assignment.id,
                    error = %e,
                    "Orphan re-evaluation skipped assignment"
                );
            }
        }
    }

    /// Rebind the assignment's device onto the target instance.
    async fn fire(&self, assignment: &Assignment) -> Result<()> {
        let device = match assignment.device_uuid {
            Some(device) => device,
            None => {
                // Clock-triggered rules need a concrete device; device-less
                // rules only make sense on completion signals.
                warn!(
                    assignment = assignment.id,
                    "Time-triggered assignment has no device, skipping"
                );
                return Ok(());
            }
        };
        self.fire_for_device(assignment, device).await
    }

    async fn fire_for_device(&self, assignment: &Assignment, device: Uuid) -> Result<()> {
        if self.devices.get(device).await?.is_none() {
            return Err(DispatchError::NotFound(format!("device {device}")));
        }
        if self
            .binding
            .instance_of(device)
            .await
            .as_deref()
            == Some(assignment.instance_name.as_str())
        {
            debug!(
                assignment = assignment.id,
                device = %device,
                "Device already on target instance"
            );
            return Ok(());
        }
        self.binding.rebind(device, &assignment.instance_name).await;
        info!(
            assignment = assignment.id,
            device = %device,
            instance = %assignment.instance_name,
            "Assignment fired"
        );
        Ok(())
    }
}

#[async_trait]
impl CompletionSink for AssignmentScheduler {
    /// Fire completion-triggered assignments whose source matches the
    /// finished instance, against the devices currently bound to it.
    async fn instance_complete(&self, instance_name: &str) {
        let matching: Vec<Assignment> = {
            let state = self.state.lock().await;
            state
                .assignments
                .iter()
                .filter(|a| {
                    a.enabled
                        && a.is_completion_triggered()
                        && a.source_instance_name.as_deref() == Some(instance_name)
                })
                .cloned()
                .collect()
        };
        if matching.is_empty() {
            return;
        }

        let bound = self.binding.devices_for_instance(instance_name).await;
        for assignment in matching {
            let targets: Vec<Uuid> = match assignment.device_uuid {
                Some(device) if bound.contains(&device) => vec![device],
                Some(_) => Vec::new(),
                // Device-less rule: every device still on the source moves.
                None => bound.clone(),
            };
            for device in targets {
                if let Err(e) = self.fire_for_device(&assignment, device).await {
                    warn!(
                        assignment = assignment.id,
                        device = %device,
                        error = %e,
                        "Completion-triggered assignment skipped"
                    );
                }
            }
        }
    }
}

/// Periodic driver for [`AssignmentScheduler::tick`].
pub struct SchedulerTickJob {
    scheduler: Arc<AssignmentScheduler>,
    tick_secs: u64,
}

impl SchedulerTickJob {
    pub fn new(scheduler: Arc<AssignmentScheduler>, tick_secs: u64) -> Self {
        Self {
            scheduler,
            tick_secs,
        }
    }
}

#[async_trait]
impl Job for SchedulerTickJob {
    fn name(&self) -> &'static str {
        "assignment_scheduler_tick"
    }

    fn schedule(&self) -> Schedule {
        Schedule::Every(Duration::from_secs(self.tick_secs))
    }

    async fn run(&self) -> anyhow::Result<()> {
        self.scheduler.tick(Utc::now()).await;
        Ok(())
    }
}

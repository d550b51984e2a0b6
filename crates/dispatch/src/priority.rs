//! Bounded priority-queue controller (IV instances).
//!
//! Entities stream in from the event feed, get geofenced and ranked by
//! the instance's ordered kind allow-list, and wait in a capacity-bounded
//! queue for a device to pick them up. Dispatched entities that come back
//! without detail data are requeued by a background re-check loop.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use domain::models::{InstanceKind, MapEntity, Task, TaskAction};
use domain::services::boundary::EntityStore;
use shared::geometry::MultiArea;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::DispatchConfig;
use crate::controller::{InstanceController, TaskContext};
use crate::error::Result;
use crate::jobs::{Job, JobRunner, Schedule};

struct Dispatched {
    entity: MapEntity,
    at: DateTime<Utc>,
}

struct PriorityState {
    queue: VecDeque<MapEntity>,
    dispatched: VecDeque<Dispatched>,
    total_resolved: u64,
    window_start: DateTime<Utc>,
    window_count: u64,
}

struct PriorityShared {
    name: String,
    area: MultiArea,
    min_level: u8,
    max_level: u8,
    /// Ordered kind allow-list; earlier position = higher priority.
    allow_list: Vec<u32>,
    capacity: usize,
    staleness_secs: i64,
    redispatch_check_secs: i64,
    entities: Arc<dyn EntityStore>,
    state: Mutex<PriorityState>,
}

impl PriorityShared {
    fn rank(&self, kind: u32) -> Option<usize> {
        self.allow_list.iter().position(|k| *k == kind)
    }

    /// Queue insertion with priority ordering and worst-tail eviction.
    /// Capacity and policy rejections are normal outcomes, not errors.
    async fn add_entity(&self, entity: MapEntity) -> bool {
        let rank = match self.rank(entity.kind) {
            Some(rank) => rank,
            None => return false,
        };
        if !self.area.contains(entity.lat, entity.lon) {
            return false;
        }

        let mut state = self.state.lock().await;
        if state.queue.iter().any(|e| e.id == entity.id)
            || state.dispatched.iter().any(|d| d.entity.id == entity.id)
        {
            return false;
        }

        // First entry with a strictly worse rank; ties keep insertion order.
        let position = state.queue.iter().position(|e| {
            self.rank(e.kind).unwrap_or(usize::MAX) > rank
        });
        match position {
            Some(index) => {
                state.queue.insert(index, entity);
                if state.queue.len() > self.capacity {
                    state.queue.pop_back();
                }
                true
            }
            None if state.queue.len() < self.capacity => {
                state.queue.push_back(entity);
                true
            }
            // Would sort last in a full queue.
            None => false,
        }
    }

    /// Pop the freshest eligible head, discarding stale entries. Bounded
    /// by the queue length.
    async fn pop_task(&self) -> Option<Task> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        while let Some(entity) = state.queue.pop_front() {
            if entity.age_secs(now) > self.staleness_secs {
                debug!(
                    instance = %self.name,
                    entity = %entity.id,
                    age_secs = entity.age_secs(now),
                    "Discarding stale queue entry"
                );
                continue;
            }
            let task = Task::scan(
                self.name.clone(),
                TaskAction::ScanIv,
                entity.lat,
                entity.lon,
                self.min_level,
                self.max_level,
            );
            state.dispatched.push_back(Dispatched { entity, at: now });
            return Some(task);
        }
        None
    }

    /// One pass of the dispatched re-check. Entities past the check window
    /// that still lack detail data go back through `add_entity`.
    async fn recheck(&self) -> Result<()> {
        let now = Utc::now();
        let expired = {
            let mut state = self.state.lock().await;
            let mut expired = Vec::new();
            while let Some(front) = state.dispatched.front() {
                if (now - front.at).num_seconds() < self.redispatch_check_secs {
                    break;
                }
                if let Some(d) = state.dispatched.pop_front() {
                    expired.push(d.entity);
                }
            }
            expired
        };

        for entity in expired {
            let ids = [entity.id.clone()];
            let current = self.entities.query_by_ids(&ids).await?;
            match current.into_iter().next() {
                Some(mut fresh) if !fresh.resolved => {
                    debug!(
                        instance = %self.name,
                        entity = %fresh.id,
                        "No detail data yet, requeuing"
                    );
                    // Requeued entries get a fresh staleness budget.
                    fresh.first_seen = now;
                    self.add_entity(fresh).await;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Drop a now-resolved entity and roll the hourly-rate window.
    async fn mark_resolved(&self, entity: &MapEntity) {
        if !self.area.contains(entity.lat, entity.lon) {
            return;
        }
        let now = Utc::now();
        let mut state = self.state.lock().await;

        // Explicit found/not-found; position 0 removes like any other.
        if let Some(index) = state.queue.iter().position(|e| e.id == entity.id) {
            state.queue.remove(index);
        }
        if let Some(index) = state.dispatched.iter().position(|d| d.entity.id == entity.id) {
            state.dispatched.remove(index);
        }

        state.total_resolved += 1;
        if now - state.window_start >= ChronoDuration::hours(1) {
            state.window_start = now;
            state.window_count = 0;
        }
        state.window_count += 1;
    }
}

struct RecheckJob {
    shared: Arc<PriorityShared>,
    tick_secs: u64,
}

#[async_trait]
impl Job for RecheckJob {
    fn name(&self) -> &'static str {
        "priority_recheck"
    }

    fn schedule(&self) -> Schedule {
        Schedule::Every(Duration::from_secs(self.tick_secs))
    }

    async fn run(&self) -> anyhow::Result<()> {
        self.shared.recheck().await?;
        Ok(())
    }
}

pub struct PriorityController {
    shared: Arc<PriorityShared>,
    runner: Mutex<JobRunner>,
}

impl PriorityController {
    pub fn new(
        name: impl Into<String>,
        area: MultiArea,
        min_level: u8,
        max_level: u8,
        allow_list: Vec<u32>,
        capacity: usize,
        config: &DispatchConfig,
        entities: Arc<dyn EntityStore>,
    ) -> Self {
        let shared = Arc::new(PriorityShared {
            name: name.into(),
            area,
            min_level,
            max_level,
            allow_list,
            capacity,
            staleness_secs: config.staleness_secs,
            redispatch_check_secs: config.redispatch_check_secs,
            entities,
            state: Mutex::new(PriorityState {
                queue: VecDeque::new(),
                dispatched: VecDeque::new(),
                total_resolved: 0,
                window_start: Utc::now(),
                window_count: 0,
            }),
        });

        let mut runner = JobRunner::new();
        runner.spawn(Arc::new(RecheckJob {
            shared: Arc::clone(&shared),
            tick_secs: config.recheck_tick_secs,
        }));

        Self {
            shared,
            runner: Mutex::new(runner),
        }
    }
}

#[async_trait]
impl InstanceController for PriorityController {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn kind(&self) -> InstanceKind {
        InstanceKind::PriorityIv
    }

    async fn get_task(&self, _ctx: &TaskContext) -> Result<Option<Task>> {
        Ok(self.shared.pop_task().await)
    }

    async fn status(&self) -> Result<String> {
        let state = self.shared.state.lock().await;
        let elapsed = (Utc::now() - state.window_start).num_seconds().max(1);
        let per_hour = state.window_count * 3600 / elapsed as u64;
        Ok(format!(
            "Queue: {}, resolved: {} ({}/h)",
            state.queue.len(),
            state.total_resolved,
            per_hour
        ))
    }

    async fn ingest(&self, entity: MapEntity) -> Result<()> {
        self.shared.add_entity(entity).await;
        Ok(())
    }

    async fn entity_resolved(&self, entity: &MapEntity) {
        self.shared.mark_resolved(entity).await;
    }

    async fn queue_snapshot(&self) -> Option<Vec<MapEntity>> {
        let state = self.shared.state.lock().await;
        Some(state.queue.iter().cloned().collect())
    }

    async fn stop(&self) {
        self.runner.lock().await.shutdown();
    }
}

//! Exhaustive sweep controller (quest instances).
//!
//! Two-phase operation. The bootstrap phase walks the covering set of
//! geodesic cells the backend has never scanned, batching sibling cells
//! per task. The sweep phase then hands out stop-like targets one at a
//! time until today's set is exhausted, at which point the controller
//! signals instance completion to the assignment scheduler. A midnight
//! timer clears the per-day completion markers and restarts the sweep.

use async_trait::async_trait;
use chrono::Utc;
use domain::models::{InstanceKind, MapEntity, Task, TaskAction};
use domain::services::boundary::{AccountPool, CellCoverage, CompletionSink, EntityStore};
use shared::cooldown::{cooldown_secs, MAX_COOLDOWN_SECS};
use shared::geometry::{MultiArea, Waypoint};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::controller::{InstanceController, TaskContext};
use crate::error::Result;
use crate::jobs::{Job, JobRunner, Schedule};

/// Half-width in degrees of the sibling-batching square around a
/// bootstrap cell's center. Roughly one cell ring at the default level.
const SIBLING_HALF_DEG: f64 = 0.015;

/// External collaborators a sweep instance needs.
#[derive(Clone)]
pub struct SweepDeps {
    pub entities: Arc<dyn EntityStore>,
    pub accounts: Arc<dyn AccountPool>,
    pub cells: Arc<dyn CellCoverage>,
    pub completion: Arc<dyn CompletionSink>,
}

struct SweepState {
    /// Missing cells still to be visited before any target sweep.
    bootstrap: VecDeque<u64>,
    bootstrap_loaded: bool,
    bootstrapped: bool,
    /// Ids of every known target inside the fence.
    all_targets: Vec<String>,
    targets_loaded: bool,
    /// Targets still to hand out today.
    pending: Vec<MapEntity>,
    attempts: HashMap<String, u32>,
    completion_signaled: bool,
}

impl SweepState {
    fn new() -> Self {
        Self {
            bootstrap: VecDeque::new(),
            bootstrap_loaded: false,
            bootstrapped: false,
            all_targets: Vec::new(),
            targets_loaded: false,
            pending: Vec::new(),
            attempts: HashMap::new(),
            completion_signaled: false,
        }
    }
}

struct SweepShared {
    name: String,
    area: MultiArea,
    min_level: u8,
    max_level: u8,
    spin_limit: u32,
    max_retries: u32,
    cell_level: u8,
    max_cells: usize,
    deps: SweepDeps,
    state: Mutex<SweepState>,
}

impl SweepShared {
    /// Compute the missing-cell work queue for the fence.
    async fn load_bootstrap(&self, state: &mut SweepState) -> Result<()> {
        let covering = self
            .deps
            .cells
            .covering_cells(self.cell_level, self.max_cells, &self.area)
            .await?;
        let known = self.deps.cells.known_cells(&covering).await?;
        let missing: VecDeque<u64> = covering
            .into_iter()
            .filter(|id| !known.contains(id))
            .collect();

        info!(
            instance = %self.name,
            missing = missing.len(),
            "Bootstrap coverage computed"
        );
        state.bootstrap = missing;
        state.bootstrap_loaded = true;
        Ok(())
    }

    /// Discover every target inside the fence and rebuild today's pending
    /// set from scratch.
    async fn reload_targets(&self, state: &mut SweepState) -> Result<()> {
        let bbox = self.area.bounding_box();
        let found = self.deps.entities.query_in_bounds(bbox).await?;
        let targets: Vec<MapEntity> = found
            .into_iter()
            .filter(|e| e.enabled && self.area.contains(e.lat, e.lon))
            .collect();

        state.all_targets = targets.iter().map(|e| e.id.clone()).collect();
        state.targets_loaded = true;
        state.pending = targets
            .into_iter()
            .filter(|e| !e.daily_done && self.attempts_ok(state, &e.id))
            .collect();
        if !state.pending.is_empty() {
            state.completion_signaled = false;
        }
        debug!(
            instance = %self.name,
            total = state.all_targets.len(),
            pending = state.pending.len(),
            "Sweep targets reloaded"
        );
        Ok(())
    }

    /// Rebuild pending from the full target list, re-fetching current
    /// completion status. Targets past the retry limit are dropped.
    async fn refresh_pending(&self, state: &mut SweepState) -> Result<()> {
        if !state.targets_loaded {
            return self.reload_targets(state).await;
        }
        let current = self.deps.entities.query_by_ids(&state.all_targets).await?;
        state.pending = current
            .into_iter()
            .filter(|e| e.enabled && !e.daily_done && self.attempts_ok(state, &e.id))
            .collect();
        if !state.pending.is_empty() {
            state.completion_signaled = false;
        }
        Ok(())
    }

    fn attempts_ok(&self, state: &SweepState, id: &str) -> bool {
        state.attempts.get(id).copied().unwrap_or(0) <= self.max_retries
    }

    /// Signal instance completion at most once per exhaustion.
    async fn signal_complete(&self, state: &mut SweepState) {
        if state.completion_signaled {
            return;
        }
        state.completion_signaled = true;
        info!(instance = %self.name, "Sweep exhausted, signaling completion");
        self.deps.completion.instance_complete(&self.name).await;
    }

    /// Pop one missing cell and batch its siblings into the same task.
    async fn bootstrap_task(&self, state: &mut SweepState) -> Result<Option<Task>> {
        let cell = match state.bootstrap.pop_front() {
            Some(cell) => cell,
            None => return Ok(None),
        };
        let center = self.deps.cells.cell_center(cell);

        // Nearby empty cells get covered by the same wide scan, so drop
        // them from the queue as well.
        if let Ok(square) = sibling_square(center) {
            let siblings = self
                .deps
                .cells
                .covering_cells(self.cell_level, 128, &square)
                .await?;
            state.bootstrap.retain(|id| !siblings.contains(id));
        }

        Ok(Some(Task::scan(
            self.name.clone(),
            TaskAction::ScanBootstrap,
            center.lat,
            center.lon,
            self.min_level,
            self.max_level,
        )))
    }

    /// The sweep-phase poll body. Assumes the state lock is held.
    async fn sweep_task(&self, ctx: &TaskContext, state: &mut SweepState) -> Result<Option<Task>> {
        if state.pending.is_empty() {
            self.refresh_pending(state).await?;
            if state.pending.is_empty() {
                self.signal_complete(state).await;
                return Ok(None);
            }
        }

        // Spin-limit policy: a worn-out account gets a switch directive
        // instead of a coordinate.
        let mut last_encounter = None;
        if let Some(account_id) = &ctx.account_id {
            if let Some(account) = self.deps.accounts.get_by_id(account_id).await? {
                if account.spin_count >= self.spin_limit {
                    debug!(
                        instance = %self.name,
                        account = %account.id,
                        "Spin limit reached, issuing account switch"
                    );
                    return Ok(Some(Task::switch_account(
                        self.name.clone(),
                        self.min_level,
                        self.max_level,
                    )));
                }
                self.deps.accounts.record_spin(account_id).await?;
                last_encounter = account.last_encounter();
            }
        }

        // Pending is non-empty here; pick the nearest target when a prior
        // encounter location exists, otherwise the first.
        let index = match &last_encounter {
            Some((from, _)) => nearest_index(&state.pending, from).unwrap_or(0),
            None => 0,
        };
        let target = state.pending.remove(index);
        *state.attempts.entry(target.id.clone()).or_insert(0) += 1;

        let mut task = Task::scan(
            self.name.clone(),
            TaskAction::ScanQuest,
            target.lat,
            target.lon,
            self.min_level,
            self.max_level,
        );
        if let Some((from, time)) = last_encounter {
            let distance_km = from.distance_m(&target.waypoint()) / 1000.0;
            let cooldown = cooldown_secs(distance_km);
            let elapsed = (Utc::now() - time).num_seconds().max(0) as u32;
            let delay = cooldown.saturating_sub(elapsed).min(MAX_COOLDOWN_SECS);
            if delay > 0 {
                task = task.with_delay(delay);
            }
        }
        if let Some(account_id) = &ctx.account_id {
            self.deps
                .accounts
                .record_encounter(account_id, target.lat, target.lon, Utc::now())
                .await?;
        }

        // Last target handed out: refresh eagerly so the next poll sees
        // either retries or the completion signal.
        if state.pending.is_empty() {
            self.refresh_pending(state).await?;
            if state.pending.is_empty() {
                self.signal_complete(state).await;
            }
        }

        Ok(Some(task))
    }

    /// The authoritative daily reset. Idempotent; safe with polls in
    /// flight since it only touches state under the lock.
    async fn daily_reset(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.all_targets.is_empty() {
            self.deps
                .entities
                .clear_daily_state(&state.all_targets)
                .await?;
        }
        state.attempts.clear();
        state.completion_signaled = false;
        self.reload_targets(&mut state).await?;
        info!(
            instance = %self.name,
            pending = state.pending.len(),
            "Daily sweep reset complete"
        );
        Ok(())
    }
}

fn nearest_index(pending: &[MapEntity], from: &Waypoint) -> Option<usize> {
    pending
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            let da = from.distance_m(&a.waypoint());
            let db = from.distance_m(&b.waypoint());
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(index, _)| index)
}

fn sibling_square(center: Waypoint) -> std::result::Result<MultiArea, shared::geometry::GeometryError> {
    MultiArea::from_rings(vec![vec![
        Waypoint::new(center.lat - SIBLING_HALF_DEG, center.lon - SIBLING_HALF_DEG),
        Waypoint::new(center.lat - SIBLING_HALF_DEG, center.lon + SIBLING_HALF_DEG),
        Waypoint::new(center.lat + SIBLING_HALF_DEG, center.lon + SIBLING_HALF_DEG),
        Waypoint::new(center.lat + SIBLING_HALF_DEG, center.lon - SIBLING_HALF_DEG),
    ]])
}

struct DailyResetJob {
    shared: Arc<SweepShared>,
    offset_secs: i32,
}

#[async_trait]
impl Job for DailyResetJob {
    fn name(&self) -> &'static str {
        "sweep_daily_reset"
    }

    fn schedule(&self) -> Schedule {
        Schedule::LocalMidnight {
            offset_secs: self.offset_secs,
        }
    }

    async fn run(&self) -> anyhow::Result<()> {
        self.shared.daily_reset().await?;
        Ok(())
    }
}

pub struct SweepController {
    shared: Arc<SweepShared>,
    runner: Mutex<JobRunner>,
}

impl SweepController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        area: MultiArea,
        min_level: u8,
        max_level: u8,
        spin_limit: u32,
        timezone_offset_secs: i32,
        config: &DispatchConfig,
        deps: SweepDeps,
    ) -> Self {
        let shared = Arc::new(SweepShared {
            name: name.into(),
            area,
            min_level,
            max_level,
            spin_limit,
            max_retries: config.max_sweep_retries,
            cell_level: config.bootstrap_cell_level,
            max_cells: config.bootstrap_max_cells,
            deps,
            state: Mutex::new(SweepState::new()),
        });

        let mut runner = JobRunner::new();
        runner.spawn(Arc::new(DailyResetJob {
            shared: Arc::clone(&shared),
            offset_secs: timezone_offset_secs,
        }));

        // Non-blocking initial refresh; the first poll also primes state
        // if this has not finished yet.
        let init = Arc::clone(&shared);
        tokio::spawn(async move {
            let mut state = init.state.lock().await;
            if !state.bootstrap_loaded {
                if let Err(e) = init.load_bootstrap(&mut state).await {
                    warn!(instance = %init.name, error = %e, "Initial bootstrap load failed");
                }
            }
            if !state.targets_loaded {
                if let Err(e) = init.reload_targets(&mut state).await {
                    warn!(instance = %init.name, error = %e, "Initial target load failed");
                }
            }
        });

        Self {
            shared,
            runner: Mutex::new(runner),
        }
    }
}

#[async_trait]
impl InstanceController for SweepController {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn kind(&self) -> InstanceKind {
        InstanceKind::SweepQuest
    }

    async fn get_task(&self, ctx: &TaskContext) -> Result<Option<Task>> {
        let shared = &self.shared;
        let mut state = shared.state.lock().await;

        if !state.bootstrap_loaded {
            shared.load_bootstrap(&mut state).await?;
        }
        if !state.bootstrapped {
            if let Some(task) = shared.bootstrap_task(&mut state).await? {
                return Ok(Some(task));
            }
            // Missing-cell queue drained: move on to the target sweep.
            state.bootstrapped = true;
            shared.refresh_pending(&mut state).await?;
        }
        shared.sweep_task(ctx, &mut state).await
    }

    async fn status(&self) -> Result<String> {
        let state = self.shared.state.lock().await;
        Ok(if !state.bootstrapped && (!state.bootstrap_loaded || !state.bootstrap.is_empty()) {
            format!("Bootstrapping: {} cells pending", state.bootstrap.len())
        } else {
            format!(
                "Quests: {} of {} pending",
                state.pending.len(),
                state.all_targets.len()
            )
        })
    }

    async fn stop(&self) {
        self.runner.lock().await.shutdown();
    }
}

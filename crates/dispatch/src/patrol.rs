//! Fixed-route patrol controller (circle instances).
//!
//! Two variants share the "current index" concept:
//!
//! - **Raid**: one shared cursor. Every device observes the same strictly
//!   sequential waypoint order, giving a globally synchronized patrol.
//! - **Pokemon**: per-device cursors with a best-effort leap-frog spacing
//!   heuristic. Occasionally (5% of polls) a device checks whether other
//!   live devices are converging on its next waypoint and holds back for
//!   a round. This is load-spacing, not mutual exclusion.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use domain::models::{InstanceKind, MapEntity, Task, TaskAction};
use rand::Rng;
use shared::geometry::Waypoint;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::controller::{InstanceController, TaskContext};
use crate::error::{DispatchError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatrolMode {
    Raid,
    Pokemon,
}

#[derive(Debug, Clone, Copy)]
struct DeviceCursor {
    index: usize,
    last_seen: DateTime<Utc>,
}

#[derive(Default)]
struct PatrolState {
    shared_index: usize,
    cursors: HashMap<Uuid, DeviceCursor>,
    last_round: Option<DateTime<Utc>>,
    prev_round: Option<DateTime<Utc>>,
}

pub struct PatrolController {
    name: String,
    mode: PatrolMode,
    route: Vec<Waypoint>,
    min_level: u8,
    max_level: u8,
    hold_probability: f64,
    live_window_secs: i64,
    state: Mutex<PatrolState>,
}

impl PatrolController {
    pub fn new(
        name: impl Into<String>,
        mode: PatrolMode,
        route: Vec<Waypoint>,
        min_level: u8,
        max_level: u8,
        hold_probability: f64,
        live_window_secs: i64,
    ) -> Result<Self> {
        let name = name.into();
        if route.is_empty() {
            return Err(DispatchError::Config(format!(
                "patrol instance {name} has an empty route"
            )));
        }
        if !(0.0..=1.0).contains(&hold_probability) {
            return Err(DispatchError::Config(format!(
                "patrol instance {name} hold probability {hold_probability} is not in 0..=1"
            )));
        }
        Ok(Self {
            name,
            mode,
            route,
            min_level,
            max_level,
            hold_probability,
            live_window_secs,
            state: Mutex::new(PatrolState::default()),
        })
    }

    fn action(&self) -> TaskAction {
        match self.mode {
            PatrolMode::Raid => TaskAction::ScanRaid,
            PatrolMode::Pokemon => TaskAction::ScanPokemon,
        }
    }

    fn task_at(&self, waypoint: Waypoint) -> Task {
        Task::scan(
            self.name.clone(),
            self.action(),
            waypoint.lat,
            waypoint.lon,
            self.min_level,
            self.max_level,
        )
    }

    fn record_round(state: &mut PatrolState, now: DateTime<Utc>) {
        state.prev_round = state.last_round;
        state.last_round = Some(now);
    }

    async fn raid_task(&self, ctx: &TaskContext) -> Task {
        let mut state = self.state.lock().await;
        let waypoint = self.route[state.shared_index];
        if !ctx.startup {
            state.shared_index += 1;
            if state.shared_index >= self.route.len() {
                state.shared_index = 0;
                Self::record_round(&mut state, Utc::now());
            }
        }
        self.task_at(waypoint)
    }

    async fn pokemon_task(&self, ctx: &TaskContext) -> Task {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let index = match state.cursors.get(&ctx.device_uuid) {
            Some(cursor) => cursor.index,
            // First contact: seed somewhere on the route to spread devices.
            None => rand::thread_rng().gen_range(0..self.route.len()),
        };
        let waypoint = self.route[index];

        let mut next = index;
        if !ctx.startup {
            let hold = rand::thread_rng().gen_bool(self.hold_probability)
                && should_hold(
                    &self.route,
                    &state.cursors,
                    ctx.device_uuid,
                    index,
                    now,
                    self.live_window_secs,
                );
            if !hold {
                next = (index + 1) % self.route.len();
                if next == 0 {
                    Self::record_round(&mut state, now);
                }
            }
        }
        state.cursors.insert(
            ctx.device_uuid,
            DeviceCursor {
                index: next,
                last_seen: now,
            },
        );
        self.task_at(waypoint)
    }
}

/// Best-effort spacing decision for the pokemon variant.
///
/// Counts live devices converging on the same next waypoint, weighting
/// nearby ones heavier; holding kicks in once the weighted congestion
/// exceeds the route length. Index 0 never holds, so round-time stamps
/// stay ordered.
fn should_hold(
    route: &[Waypoint],
    cursors: &HashMap<Uuid, DeviceCursor>,
    device: Uuid,
    index: usize,
    now: DateTime<Utc>,
    live_window_secs: i64,
) -> bool {
    if index == 0 {
        return false;
    }
    let len = route.len();
    let target_index = (index + 1) % len;
    let target = route[target_index];

    let mut congestion = 0.0;
    for (uuid, cursor) in cursors {
        if *uuid == device {
            continue;
        }
        if now - cursor.last_seen > Duration::seconds(live_window_secs) {
            continue;
        }
        let other_next = (cursor.index + 1) % len;
        if other_next == target_index || cursor.index == target_index {
            let km = route[cursor.index].distance_m(&target) / 1000.0;
            congestion += len as f64 / (0.5 + km);
        }
    }
    congestion > len as f64
}

#[async_trait]
impl InstanceController for PatrolController {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> InstanceKind {
        match self.mode {
            PatrolMode::Raid => InstanceKind::PatrolRaid,
            PatrolMode::Pokemon => InstanceKind::PatrolPokemon,
        }
    }

    async fn get_task(&self, ctx: &TaskContext) -> Result<Option<Task>> {
        let task = match self.mode {
            PatrolMode::Raid => self.raid_task(ctx).await,
            PatrolMode::Pokemon => self.pokemon_task(ctx).await,
        };
        Ok(Some(task))
    }

    async fn status(&self) -> Result<String> {
        let state = self.state.lock().await;
        Ok(match (state.prev_round, state.last_round) {
            (Some(prev), Some(last)) => {
                format!("Round time: {}s", (last - prev).num_seconds())
            }
            _ => "--".to_string(),
        })
    }

    async fn stop(&self) {
        // No background timers to halt.
    }

    async fn ingest(&self, _entity: MapEntity) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(n: usize) -> Vec<Waypoint> {
        (0..n).map(|i| Waypoint::new(i as f64, 0.0)).collect()
    }

    fn raid(n: usize) -> PatrolController {
        PatrolController::new("raid-a", PatrolMode::Raid, route(n), 0, 40, 0.05, 60).unwrap()
    }

    fn index_of(task: &Task) -> usize {
        task.lat as usize
    }

    #[test]
    fn test_empty_route_is_config_error() {
        let result =
            PatrolController::new("bad", PatrolMode::Raid, vec![], 0, 40, 0.05, 60);
        assert!(matches!(result, Err(DispatchError::Config(_))));
    }

    #[test]
    fn test_out_of_range_hold_probability_is_config_error() {
        // A percent-style override like 5 must be rejected up front; fed
        // straight to the Bernoulli draw it would panic on a later poll.
        for p in [5.0, -0.1, 1.01] {
            let result =
                PatrolController::new("bad", PatrolMode::Pokemon, route(3), 0, 40, p, 60);
            assert!(matches!(result, Err(DispatchError::Config(_))), "accepted {p}");
        }
    }

    #[tokio::test]
    async fn test_raid_startup_does_not_advance() {
        let controller = raid(3);
        let device = TaskContext::new(Uuid::new_v4()).on_startup();

        let first = controller.get_task(&device).await.unwrap().unwrap();
        let second = controller.get_task(&device).await.unwrap().unwrap();
        assert_eq!(index_of(&first), 0);
        assert_eq!(index_of(&second), 0);
    }

    #[tokio::test]
    async fn test_raid_shared_cursor_sequence() {
        // Serialized calls deliver (i, i+1, ...) mod route length with no
        // repeats until wraparound, regardless of which device polls.
        let controller = raid(4);
        let x = TaskContext::new(Uuid::new_v4());
        let y = TaskContext::new(Uuid::new_v4());

        let mut seen = Vec::new();
        for i in 0..8 {
            let ctx = if i % 2 == 0 { &x } else { &y };
            let task = controller.get_task(ctx).await.unwrap().unwrap();
            seen.push(index_of(&task));
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_raid_round_completion_recorded_once_per_traversal() {
        let controller = raid(3);
        let ctx = TaskContext::new(Uuid::new_v4());

        assert_eq!(controller.status().await.unwrap(), "--");
        for _ in 0..3 {
            controller.get_task(&ctx).await.unwrap();
        }
        // One wrap: only last_round set, still no interval to report.
        assert_eq!(controller.status().await.unwrap(), "--");

        for _ in 0..3 {
            controller.get_task(&ctx).await.unwrap();
        }
        let status = controller.status().await.unwrap();
        assert!(status.starts_with("Round time:"), "got {status}");
    }

    #[tokio::test]
    async fn test_end_to_end_raid_scenario() {
        // raid-a with 3 waypoints: startup poll holds the cursor, then
        // two devices interleave strictly sequentially and wrap.
        let controller = raid(3);
        let x = TaskContext::new(Uuid::new_v4());
        let y = TaskContext::new(Uuid::new_v4());

        let task = controller.get_task(&x.clone().on_startup()).await.unwrap().unwrap();
        assert_eq!(index_of(&task), 0);

        let task = controller.get_task(&x).await.unwrap().unwrap();
        assert_eq!(index_of(&task), 0);

        let task = controller.get_task(&y).await.unwrap().unwrap();
        assert_eq!(index_of(&task), 1);

        let task = controller.get_task(&x).await.unwrap().unwrap();
        assert_eq!(index_of(&task), 2);

        // Cursor wrapped; the round stamp is in place.
        let task = controller.get_task(&y).await.unwrap().unwrap();
        assert_eq!(index_of(&task), 0);
    }

    #[tokio::test]
    async fn test_pokemon_startup_pins_seeded_cursor() {
        let controller = PatrolController::new(
            "mon-a",
            PatrolMode::Pokemon,
            route(10),
            0,
            40,
            0.05,
            60,
        )
        .unwrap();
        let ctx = TaskContext::new(Uuid::new_v4()).on_startup();

        let first = controller.get_task(&ctx).await.unwrap().unwrap();
        let second = controller.get_task(&ctx).await.unwrap().unwrap();
        assert!(index_of(&first) < 10);
        assert_eq!(index_of(&first), index_of(&second));
    }

    #[tokio::test]
    async fn test_pokemon_advances_by_one() {
        let controller = PatrolController::new(
            "mon-a",
            PatrolMode::Pokemon,
            route(5),
            0,
            40,
            // Never run the spacing check, so advancement is deterministic.
            0.0,
            60,
        )
        .unwrap();
        let ctx = TaskContext::new(Uuid::new_v4());

        let start = index_of(&controller.get_task(&ctx).await.unwrap().unwrap());
        let next = index_of(&controller.get_task(&ctx).await.unwrap().unwrap());
        assert_eq!(next, (start + 1) % 5);
    }

    #[test]
    fn test_should_hold_never_at_index_zero() {
        let route = route(5);
        let now = Utc::now();
        let device = Uuid::new_v4();
        let mut cursors = HashMap::new();
        // A swarm of live devices parked on waypoint 1 (next of 0).
        for _ in 0..50 {
            cursors.insert(
                Uuid::new_v4(),
                DeviceCursor {
                    index: 1,
                    last_seen: now,
                },
            );
        }
        assert!(!should_hold(&route, &cursors, device, 0, now, 60));
    }

    #[test]
    fn test_should_hold_on_converging_neighbors() {
        // Waypoints ~110 m apart, two live devices already heading for the
        // same next waypoint.
        let route: Vec<Waypoint> = (0..5).map(|i| Waypoint::new(i as f64 * 0.001, 0.0)).collect();
        let now = Utc::now();
        let device = Uuid::new_v4();
        let mut cursors = HashMap::new();
        for _ in 0..2 {
            cursors.insert(
                Uuid::new_v4(),
                DeviceCursor {
                    index: 2,
                    last_seen: now,
                },
            );
        }
        assert!(should_hold(&route, &cursors, device, 1, now, 60));
    }

    #[test]
    fn test_should_hold_ignores_stale_devices() {
        let route: Vec<Waypoint> = (0..5).map(|i| Waypoint::new(i as f64 * 0.001, 0.0)).collect();
        let now = Utc::now();
        let device = Uuid::new_v4();
        let mut cursors = HashMap::new();
        for _ in 0..10 {
            cursors.insert(
                Uuid::new_v4(),
                DeviceCursor {
                    index: 2,
                    last_seen: now - Duration::seconds(120),
                },
            );
        }
        assert!(!should_hold(&route, &cursors, device, 1, now, 60));
    }

    #[test]
    fn test_should_hold_without_neighbors() {
        let route = route(5);
        assert!(!should_hold(
            &route,
            &HashMap::new(),
            Uuid::new_v4(),
            2,
            Utc::now(),
            60
        ));
    }
}

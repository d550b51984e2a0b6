//! In-memory reference implementations of the boundary traits.
//!
//! Used by the test suites and by embedders that do not need durable
//! storage. All of them are cheap `RwLock`-guarded maps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::geometry::{BoundingBox, MultiArea, Waypoint};
use std::collections::{HashMap, HashSet};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::models::{Account, Device, MapEntity};
use crate::services::boundary::{
    AccountPool, BoundaryResult, CellCoverage, CompletionSink, DeviceDirectory, EntityStore,
    EventSink,
};

/// Map-backed device directory.
#[derive(Default)]
pub struct InMemoryDeviceDirectory {
    devices: RwLock<HashMap<Uuid, Device>>,
}

impl InMemoryDeviceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, device: Device) {
        self.devices.write().await.insert(device.uuid, device);
    }
}

#[async_trait]
impl DeviceDirectory for InMemoryDeviceDirectory {
    async fn get(&self, uuid: Uuid) -> BoundaryResult<Option<Device>> {
        Ok(self.devices.read().await.get(&uuid).cloned())
    }

    async fn get_all(&self) -> BoundaryResult<Vec<Device>> {
        Ok(self.devices.read().await.values().cloned().collect())
    }

    async fn set_location(&self, uuid: Uuid, lat: f64, lon: f64) -> BoundaryResult<()> {
        if let Some(device) = self.devices.write().await.get_mut(&uuid) {
            device.last_lat = Some(lat);
            device.last_lon = Some(lon);
            device.last_seen = Utc::now();
        }
        Ok(())
    }

    async fn bind_account(&self, uuid: Uuid, account_id: &str) -> BoundaryResult<()> {
        if let Some(device) = self.devices.write().await.get_mut(&uuid) {
            device.account_id = Some(account_id.to_string());
        }
        Ok(())
    }
}

/// Map-backed account pool.
#[derive(Default)]
pub struct InMemoryAccountPool {
    accounts: RwLock<HashMap<String, Account>>,
}

impl InMemoryAccountPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, account: Account) {
        self.accounts.write().await.insert(account.id.clone(), account);
    }
}

#[async_trait]
impl AccountPool for InMemoryAccountPool {
    async fn get_available(&self, min_level: u8, max_level: u8) -> BoundaryResult<Option<Account>> {
        let accounts = self.accounts.read().await;
        // Sorted for deterministic pick order in tests.
        let mut usable: Vec<&Account> = accounts
            .values()
            .filter(|a| a.is_usable(min_level, max_level))
            .collect();
        usable.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(usable.first().map(|a| (*a).clone()))
    }

    async fn get_by_id(&self, id: &str) -> BoundaryResult<Option<Account>> {
        Ok(self.accounts.read().await.get(id).cloned())
    }

    async fn record_spin(&self, id: &str) -> BoundaryResult<()> {
        if let Some(account) = self.accounts.write().await.get_mut(id) {
            account.spin_count += 1;
        }
        Ok(())
    }

    async fn record_encounter(
        &self,
        id: &str,
        lat: f64,
        lon: f64,
        time: DateTime<Utc>,
    ) -> BoundaryResult<()> {
        if let Some(account) = self.accounts.write().await.get_mut(id) {
            account.last_encounter_lat = Some(lat);
            account.last_encounter_lon = Some(lon);
            account.last_encounter_time = Some(time);
        }
        Ok(())
    }
}

/// Map-backed entity store.
#[derive(Default)]
pub struct InMemoryEntityStore {
    entities: RwLock<HashMap<String, MapEntity>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, entity: MapEntity) {
        self.entities.write().await.insert(entity.id.clone(), entity);
    }

    pub async fn set_daily_done(&self, id: &str) {
        if let Some(e) = self.entities.write().await.get_mut(id) {
            e.daily_done = true;
        }
    }

    pub async fn set_resolved(&self, id: &str) {
        if let Some(e) = self.entities.write().await.get_mut(id) {
            e.resolved = true;
        }
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn query_in_bounds(&self, bbox: BoundingBox) -> BoundaryResult<Vec<MapEntity>> {
        Ok(self
            .entities
            .read()
            .await
            .values()
            .filter(|e| bbox.contains(e.lat, e.lon))
            .cloned()
            .collect())
    }

    async fn query_by_ids(&self, ids: &[String]) -> BoundaryResult<Vec<MapEntity>> {
        let entities = self.entities.read().await;
        Ok(ids.iter().filter_map(|id| entities.get(id).cloned()).collect())
    }

    async fn clear_daily_state(&self, ids: &[String]) -> BoundaryResult<()> {
        let mut entities = self.entities.write().await;
        for id in ids {
            if let Some(e) = entities.get_mut(id) {
                e.daily_done = false;
            }
        }
        Ok(())
    }
}

/// Quantized-grid cell coverage.
///
/// Cells are axis-aligned squares of `360 / 2^level` degrees. Ids pack the
/// level and the two grid indices, so centers decode without extra state.
#[derive(Default)]
pub struct GridCellCoverage {
    known: RwLock<HashSet<u64>>,
}

impl GridCellCoverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn mark_known(&self, ids: &[u64]) {
        self.known.write().await.extend(ids.iter().copied());
    }

    fn cell_size_deg(level: u8) -> f64 {
        360.0 / (1u64 << level.min(29)) as f64
    }

    fn pack(level: u8, x: u64, y: u64) -> u64 {
        ((level as u64) << 58) | (x << 29) | y
    }

    fn unpack(id: u64) -> (u8, u64, u64) {
        let level = (id >> 58) as u8;
        let x = (id >> 29) & ((1 << 29) - 1);
        let y = id & ((1 << 29) - 1);
        (level, x, y)
    }

    fn cell_id(level: u8, lat: f64, lon: f64) -> u64 {
        let size = Self::cell_size_deg(level);
        let x = ((lon + 180.0) / size).floor().max(0.0) as u64;
        let y = ((lat + 90.0) / size).floor().max(0.0) as u64;
        Self::pack(level, x, y)
    }
}

#[async_trait]
impl CellCoverage for GridCellCoverage {
    async fn covering_cells(
        &self,
        level: u8,
        max_cells: usize,
        area: &MultiArea,
    ) -> BoundaryResult<Vec<u64>> {
        let bbox = area.bounding_box();
        let size = Self::cell_size_deg(level);
        let mut cells = Vec::new();

        let mut lat = (bbox.min_lat / size).floor() * size;
        while lat <= bbox.max_lat && cells.len() < max_cells {
            let mut lon = (bbox.min_lon / size).floor() * size;
            while lon <= bbox.max_lon && cells.len() < max_cells {
                let center_lat = lat + size / 2.0;
                let center_lon = lon + size / 2.0;
                if area.contains(center_lat, center_lon) {
                    cells.push(Self::cell_id(level, center_lat, center_lon));
                }
                lon += size;
            }
            lat += size;
        }
        Ok(cells)
    }

    async fn known_cells(&self, ids: &[u64]) -> BoundaryResult<Vec<u64>> {
        let known = self.known.read().await;
        Ok(ids.iter().copied().filter(|id| known.contains(id)).collect())
    }

    fn cell_center(&self, id: u64) -> Waypoint {
        let (level, x, y) = Self::unpack(id);
        let size = Self::cell_size_deg(level);
        Waypoint::new(
            (y as f64) * size - 90.0 + size / 2.0,
            (x as f64) * size - 180.0 + size / 2.0,
        )
    }
}

/// Completion sink that records the signaled instance names.
#[derive(Default)]
pub struct RecordingCompletionSink {
    completions: Mutex<Vec<String>>,
}

impl RecordingCompletionSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn completions(&self) -> Vec<String> {
        self.completions.lock().await.clone()
    }
}

#[async_trait]
impl CompletionSink for RecordingCompletionSink {
    async fn instance_complete(&self, instance_name: &str) {
        self.completions.lock().await.push(instance_name.to_string());
    }
}

/// Event sink that records published entities.
#[derive(Default)]
pub struct RecordingEventSink {
    published: Mutex<Vec<MapEntity>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<MapEntity> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish_resolved(&self, entity: &MapEntity) {
        self.published.lock().await.push(entity.clone());
    }
}

//! Async traits for the external collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::geometry::{BoundingBox, MultiArea, Waypoint};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Account, Device, MapEntity};

/// Failure surfaced by a boundary call.
///
/// Callers treat these as transient: log, return "no task", retry later.
#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
}

pub type BoundaryResult<T> = Result<T, BoundaryError>;

/// Directory of known devices.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn get(&self, uuid: Uuid) -> BoundaryResult<Option<Device>>;

    async fn get_all(&self) -> BoundaryResult<Vec<Device>>;

    /// Record the location a device was last sent to.
    async fn set_location(&self, uuid: Uuid, lat: f64, lon: f64) -> BoundaryResult<()>;

    async fn bind_account(&self, uuid: Uuid, account_id: &str) -> BoundaryResult<()>;
}

/// Pool of scanner accounts.
#[async_trait]
pub trait AccountPool: Send + Sync {
    /// An unused account whose level fits the given bounds, if any.
    async fn get_available(&self, min_level: u8, max_level: u8) -> BoundaryResult<Option<Account>>;

    async fn get_by_id(&self, id: &str) -> BoundaryResult<Option<Account>>;

    async fn record_spin(&self, id: &str) -> BoundaryResult<()>;

    async fn record_encounter(
        &self,
        id: &str,
        lat: f64,
        lon: f64,
        time: DateTime<Utc>,
    ) -> BoundaryResult<()>;
}

/// Store of geofenced map entities.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn query_in_bounds(&self, bbox: BoundingBox) -> BoundaryResult<Vec<MapEntity>>;

    async fn query_by_ids(&self, ids: &[String]) -> BoundaryResult<Vec<MapEntity>>;

    /// Clear the per-day completion marker on the given entities.
    async fn clear_daily_state(&self, ids: &[String]) -> BoundaryResult<()>;
}

/// Geodesic cell indexing at a fixed subdivision level.
#[async_trait]
pub trait CellCoverage: Send + Sync {
    /// Cells at `level` covering the area, capped at `max_cells`.
    async fn covering_cells(
        &self,
        level: u8,
        max_cells: usize,
        area: &MultiArea,
    ) -> BoundaryResult<Vec<u64>>;

    /// The subset of `ids` already scanned at some point.
    async fn known_cells(&self, ids: &[u64]) -> BoundaryResult<Vec<u64>>;

    /// Center coordinate of a cell.
    fn cell_center(&self, id: u64) -> Waypoint;
}

/// Downstream feed for resolved entities.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish_resolved(&self, entity: &MapEntity);
}

/// Consumer of instance-complete signals (the assignment scheduler).
#[async_trait]
pub trait CompletionSink: Send + Sync {
    async fn instance_complete(&self, instance_name: &str);
}

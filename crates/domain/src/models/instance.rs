//! Instance domain model.
//!
//! An instance is a named, configured scan area plus a behavior kind. The
//! kind is a closed enum resolved once at construction time into a concrete
//! controller; there is no string-based dispatch at runtime.

use serde::{Deserialize, Serialize};
use shared::geometry::Waypoint;
use validator::{Validate, ValidationError};

/// Behavior kind of a scan instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceKind {
    PatrolPokemon,
    PatrolRaid,
    SweepQuest,
    PriorityIv,
}

impl InstanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceKind::PatrolPokemon => "patrol_pokemon",
            InstanceKind::PatrolRaid => "patrol_raid",
            InstanceKind::SweepQuest => "sweep_quest",
            InstanceKind::PriorityIv => "priority_iv",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "patrol_pokemon" => Some(InstanceKind::PatrolPokemon),
            "patrol_raid" => Some(InstanceKind::PatrolRaid),
            "sweep_quest" => Some(InstanceKind::SweepQuest),
            "priority_iv" => Some(InstanceKind::PriorityIv),
            _ => None,
        }
    }

    /// Patrol kinds walk a waypoint route; the others own fence polygons.
    pub fn wants_route(&self) -> bool {
        matches!(self, InstanceKind::PatrolPokemon | InstanceKind::PatrolRaid)
    }
}

/// Raw instance geometry as configured.
///
/// A `Fence` is one or more vertex rings (auto-closed into polygons at
/// construction); a `Route` is an ordered, non-closed waypoint list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates", rename_all = "lowercase")]
pub enum InstanceGeometry {
    Fence(Vec<Vec<Waypoint>>),
    Route(Vec<Waypoint>),
}

impl InstanceGeometry {
    pub fn is_empty(&self) -> bool {
        match self {
            InstanceGeometry::Fence(rings) => rings.iter().all(|r| r.is_empty()),
            InstanceGeometry::Route(route) => route.is_empty(),
        }
    }

    /// Every configured waypoint, ring structure flattened away.
    pub fn waypoints(&self) -> Box<dyn Iterator<Item = &Waypoint> + '_> {
        match self {
            InstanceGeometry::Fence(rings) => Box::new(rings.iter().flatten()),
            InstanceGeometry::Route(route) => Box::new(route.iter()),
        }
    }
}

/// Kind-specific tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceTuning {
    /// Stop-spin budget per account before a switch is forced (sweep only).
    #[serde(default = "default_spin_limit")]
    pub spin_limit: u32,

    /// Capacity of the priority queue (priority only).
    #[serde(default = "default_queue_limit")]
    pub queue_limit: usize,

    /// Fixed UTC offset of the instance's locale, in seconds.
    #[serde(default)]
    pub timezone_offset_secs: i32,

    /// Entity kinds of interest, ordered by priority (priority only).
    #[serde(default)]
    pub priority_kinds: Vec<u32>,
}

impl Default for InstanceTuning {
    fn default() -> Self {
        Self {
            spin_limit: default_spin_limit(),
            queue_limit: default_queue_limit(),
            timezone_offset_secs: 0,
            priority_kinds: Vec::new(),
        }
    }
}

fn default_spin_limit() -> u32 {
    1000
}
fn default_queue_limit() -> usize {
    100
}

/// A configured scan instance. Identity is the unique name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub name: String,
    pub kind: InstanceKind,
    pub geometry: InstanceGeometry,
    pub min_level: u8,
    pub max_level: u8,
    #[serde(default)]
    pub tuning: InstanceTuning,
}

/// Request payload for creating or replacing an instance.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_instance_request"))]
pub struct CreateInstanceRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    pub kind: InstanceKind,

    pub geometry: InstanceGeometry,

    #[validate(custom(function = "shared::validation::validate_level"))]
    pub min_level: u8,

    #[validate(custom(function = "shared::validation::validate_level"))]
    pub max_level: u8,

    #[serde(default)]
    pub tuning: InstanceTuning,
}

fn validate_instance_request(req: &CreateInstanceRequest) -> Result<(), ValidationError> {
    if req.min_level > req.max_level {
        let mut err = ValidationError::new("level_order");
        err.message = Some("minLevel must not exceed maxLevel".into());
        return Err(err);
    }
    if req.geometry.is_empty() {
        let mut err = ValidationError::new("geometry_empty");
        err.message = Some("Geometry must contain at least one coordinate".into());
        return Err(err);
    }
    for waypoint in req.geometry.waypoints() {
        shared::validation::validate_latitude(waypoint.lat)?;
        shared::validation::validate_longitude(waypoint.lon)?;
    }
    Ok(())
}

impl From<CreateInstanceRequest> for Instance {
    fn from(req: CreateInstanceRequest) -> Self {
        Self {
            name: req.name,
            kind: req.kind,
            geometry: req.geometry,
            min_level: req.min_level,
            max_level: req.max_level,
            tuning: req.tuning,
        }
    }
}

//! Geometry types for scan areas and patrol routes.
//!
//! Scan areas are ring-closed polygons in WGS84 coordinates. Containment
//! tests over a [`MultiArea`] use union semantics: a point is inside when
//! any constituent polygon contains it.

use geo::{Contains, HaversineDistance, LineString, Point, Polygon};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// A single geographic coordinate (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
}

impl Waypoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance to another waypoint, in meters.
    pub fn distance_m(&self, other: &Waypoint) -> f64 {
        Point::new(self.lon, self.lat).haversine_distance(&Point::new(other.lon, other.lat))
    }
}

/// A geographic bounding box in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Smallest box enclosing all given waypoints. `None` when empty.
    pub fn enclosing(points: &[Waypoint]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = Self {
            min_lat: first.lat,
            min_lon: first.lon,
            max_lat: first.lat,
            max_lon: first.lon,
        };
        for p in &points[1..] {
            bbox.min_lat = bbox.min_lat.min(p.lat);
            bbox.min_lon = bbox.min_lon.min(p.lon);
            bbox.max_lat = bbox.max_lat.max(p.lat);
            bbox.max_lon = bbox.max_lon.max(p.lon);
        }
        Some(bbox)
    }

    /// Merge two boxes into the smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_lat: self.min_lat.min(other.min_lat),
            min_lon: self.min_lon.min(other.min_lon),
            max_lat: self.max_lat.max(other.max_lat),
            max_lon: self.max_lon.max(other.max_lon),
        }
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("polygon requires at least 3 distinct vertices, got {0}")]
    TooFewVertices(usize),
    #[error("multi-area has no usable polygon")]
    NoUsablePolygon,
}

/// A single ring-closed scan polygon.
#[derive(Debug, Clone)]
pub struct Area {
    ring: Vec<Waypoint>,
    polygon: Polygon<f64>,
}

impl Area {
    /// Builds an area from an ordered vertex ring.
    ///
    /// If the first and last vertex differ the ring is closed by
    /// duplicating the first vertex.
    pub fn new(mut ring: Vec<Waypoint>) -> Result<Self, GeometryError> {
        let mut distinct = ring.clone();
        distinct.dedup_by(|a, b| a == b);
        if distinct.first() == distinct.last() && distinct.len() > 1 {
            distinct.pop();
        }
        if distinct.len() < 3 {
            return Err(GeometryError::TooFewVertices(distinct.len()));
        }
        if ring.first() != ring.last() {
            ring.push(ring[0]);
        }
        let exterior: LineString<f64> =
            LineString::from(ring.iter().map(|w| (w.lon, w.lat)).collect::<Vec<_>>());
        Ok(Self {
            polygon: Polygon::new(exterior, vec![]),
            ring,
        })
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.polygon.contains(&Point::new(lon, lat))
    }

    /// The closed vertex ring (first == last).
    pub fn ring(&self) -> &[Waypoint] {
        &self.ring
    }

    pub fn bounding_box(&self) -> BoundingBox {
        // The ring is never empty after construction.
        BoundingBox::enclosing(&self.ring).unwrap_or(BoundingBox {
            min_lat: 0.0,
            min_lon: 0.0,
            max_lat: 0.0,
            max_lon: 0.0,
        })
    }
}

/// One or more disjoint scan polygons evaluated with union semantics.
#[derive(Debug, Clone)]
pub struct MultiArea {
    areas: Vec<Area>,
}

impl MultiArea {
    /// Builds a multi-area from raw vertex rings.
    ///
    /// Degenerate rings (fewer than 3 distinct vertices) are skipped with a
    /// warning; construction fails only when no ring is usable.
    pub fn from_rings(rings: Vec<Vec<Waypoint>>) -> Result<Self, GeometryError> {
        let mut areas = Vec::with_capacity(rings.len());
        for (i, ring) in rings.into_iter().enumerate() {
            match Area::new(ring) {
                Ok(area) => areas.push(area),
                Err(e) => warn!(ring = i, error = %e, "Skipping degenerate polygon"),
            }
        }
        if areas.is_empty() {
            return Err(GeometryError::NoUsablePolygon);
        }
        Ok(Self { areas })
    }

    /// True when any constituent polygon contains the point.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.areas.iter().any(|a| a.contains(lat, lon))
    }

    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    /// Bounding box of the whole multi-area.
    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = self.areas[0].bounding_box();
        for area in &self.areas[1..] {
            bbox = bbox.union(&area.bounding_box());
        }
        bbox
    }
}

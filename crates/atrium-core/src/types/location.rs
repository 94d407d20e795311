//! User location fixes

use crate::geometry::Point;
use crate::ids::BuildingId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a fix came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    /// Satellite fix
    Gps,
    /// Beacon triangulation
    Beacon,
    /// Wi-Fi positioning
    Wifi,
    /// Entered by the user
    Manual,
    /// Scanned location code
    QrCode,
}

/// An accepted, immutable location fix.
///
/// Each update produces a new value; earlier values are never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    /// Position in the building-local frame
    pub point: Point,
    /// Floor number
    pub floor: i32,
    /// Building the fix resolved to
    pub building: BuildingId,
    /// Estimated accuracy radius in meters
    pub accuracy: f64,
    /// Fix origin
    pub source: LocationSource,
    /// When the fix was accepted
    pub timestamp: DateTime<Utc>,
}

impl UserLocation {
    /// Planar distance to another fix, ignoring floors.
    pub fn distance_to(&self, other: &UserLocation) -> f64 {
        self.point.distance_to(&other.point)
    }

    /// Whether both fixes are in the same building and on the same floor.
    pub fn same_area(&self, other: &UserLocation) -> bool {
        self.building == other.building && self.floor == other.floor
    }
}

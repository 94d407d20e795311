//! Geofences and membership transitions

use atrium_core::{BuildingId, GeofenceId, Point, Polygon, UserLocation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Region covered by a geofence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum GeofenceShape {
    /// Disc around a center
    Circle {
        /// Center point
        center: Point,
        /// Radius in meters, boundary inclusive
        radius_m: f64,
    },
    /// Simple polygon
    Polygon {
        /// Outline
        outline: Polygon,
    },
}

/// A named region whose crossings are reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    /// Identifier
    pub id: GeofenceId,
    /// Display name
    pub name: String,
    /// Covered region
    #[serde(flatten)]
    pub shape: GeofenceShape,
    /// Only fixes in this building count
    #[serde(default)]
    pub building: Option<BuildingId>,
    /// Only fixes on this floor count
    #[serde(default)]
    pub floor: Option<i32>,
}

impl Geofence {
    /// Circular geofence.
    pub fn circle(id: &str, name: &str, center: Point, radius_m: f64) -> Self {
        Self {
            id: GeofenceId::new(id),
            name: name.to_string(),
            shape: GeofenceShape::Circle { center, radius_m },
            building: None,
            floor: None,
        }
    }

    /// Whether a fix lies inside.
    pub fn contains(&self, location: &UserLocation) -> bool {
        if self.building.as_ref().map_or(false, |b| b != &location.building) {
            return false;
        }
        if self.floor.map_or(false, |f| f != location.floor) {
            return false;
        }
        match &self.shape {
            GeofenceShape::Circle { center, radius_m } => {
                location.point.distance_to(center) <= *radius_m
            }
            GeofenceShape::Polygon { outline } => outline.contains(&location.point),
        }
    }
}

/// Direction of a membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossing {
    /// Absent before, present now
    Enter,
    /// Present before, absent now
    Exit,
}

/// Geofences a user is currently inside.
#[derive(Debug, Clone, Default)]
pub struct GeofenceMembership {
    inside: HashSet<GeofenceId>,
}

impl GeofenceMembership {
    /// Whether the user is inside a geofence.
    pub fn is_inside(&self, id: &GeofenceId) -> bool {
        self.inside.contains(id)
    }

    /// Recompute membership for a fix, returning the crossings in geofence order.
    pub fn update<'g>(
        &mut self,
        geofences: &'g [Geofence],
        location: &UserLocation,
    ) -> Vec<(Crossing, &'g Geofence)> {
        let mut crossings = Vec::new();
        for geofence in geofences {
            let inside = geofence.contains(location);
            let was_inside = self.inside.contains(&geofence.id);
            if inside && !was_inside {
                self.inside.insert(geofence.id.clone());
                crossings.push((Crossing::Enter, geofence));
            } else if !inside && was_inside {
                self.inside.remove(&geofence.id);
                crossings.push((Crossing::Exit, geofence));
            }
        }
        crossings
    }
}

//! Building footprint resolver

use super::{FloorHint, ResolvedPlacement, SpatialResolver};
use crate::error::AtriumResult;
use crate::geometry::{Point, Polygon};
use crate::ids::BuildingId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

fn default_ground_floor() -> i32 {
    1
}

/// Outline of one building in the local frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingFootprint {
    /// Building identifier
    pub building: BuildingId,
    /// Outline polygon
    pub outline: Polygon,
    /// Floor used when the fix source gives no floor hint for this building
    #[serde(default = "default_ground_floor")]
    pub ground_floor: i32,
}

/// Resolves points to buildings by footprint containment.
///
/// Floors cannot be derived from a planar point, so the floor comes from the
/// hint when it names the same building, else the building's ground floor.
#[derive(Debug, Clone, Default)]
pub struct BuildingFootprints {
    footprints: Vec<BuildingFootprint>,
}

impl BuildingFootprints {
    /// Create a resolver over the given footprints. Earlier entries win on overlap.
    pub fn new(footprints: Vec<BuildingFootprint>) -> Self {
        Self { footprints }
    }

    fn locate(&self, point: &Point) -> Option<&BuildingFootprint> {
        self.footprints.iter().find(|f| f.outline.contains(point))
    }
}

#[async_trait]
impl SpatialResolver for BuildingFootprints {
    async fn resolve(
        &self,
        point: Point,
        hint: Option<&FloorHint>,
    ) -> AtriumResult<Option<ResolvedPlacement>> {
        let Some(footprint) = self.locate(&point) else {
            return Ok(None);
        };
        let floor = match hint {
            Some(h) if h.building == footprint.building => h.floor,
            _ => footprint.ground_floor,
        };
        Ok(Some(ResolvedPlacement {
            building: footprint.building.clone(),
            floor,
        }))
    }
}

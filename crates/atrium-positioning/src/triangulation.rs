//! RSSI triangulation
//!
//! Matches scan observations against active registry beacons and solves for
//! a position as the weighted mean of the matched beacon positions. Each
//! observation is weighted by normalized signal strength times inverse claimed
//! accuracy:
//!
//! ```text
//! w = max(0.1, (rssi + 100) / 100) * max(0.1, 1 / (accuracy + 1))
//! ```
//!
//! Accuracy is the mean claimed accuracy scaled by a GDOP factor from the
//! area of the first three beacons' triangle. Confidence averages a
//! beacon-count score and an RSSI-consistency score.

use crate::registry::BeaconRegistryStore;
use atrium_core::{
    geometry::triangle_area, AtriumError, AtriumResult, Beacon, BeaconId, BeaconObservation,
    BuildingId, Clock, FloorHint, Point, ProximityZone,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Triangulation tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangulationConfig {
    /// Matched observations required for a solve
    pub min_beacons: usize,
    /// Beacon count at which the count score saturates
    pub saturation_beacons: usize,
    /// RSSI variance (dBm²) at which the consistency score reaches zero
    pub rssi_variance_scale: f64,
    /// Triangle area (m²) at which GDOP reaches its minimum
    pub reference_area_m2: f64,
    /// Lower GDOP bound
    pub gdop_min: f64,
    /// Upper GDOP bound
    pub gdop_max: f64,
    /// Absolute accuracy ceiling in meters
    pub accuracy_cap_m: f64,
}

impl Default for TriangulationConfig {
    fn default() -> Self {
        Self {
            min_beacons: 3,
            saturation_beacons: 5,
            rssi_variance_scale: 1000.0,
            reference_area_m2: 100.0,
            gdop_min: 1.0,
            gdop_max: 5.0,
            accuracy_cap_m: 10.0,
        }
    }
}

impl TriangulationConfig {
    /// Reject nonsensical values.
    pub fn validate(&self) -> AtriumResult<()> {
        if self.min_beacons < 3 {
            return Err(AtriumError::configuration(
                "triangulation.min_beacons must be at least 3",
            ));
        }
        if self.saturation_beacons == 0 {
            return Err(AtriumError::configuration(
                "triangulation.saturation_beacons must be positive",
            ));
        }
        if !(self.gdop_min > 0.0 && self.gdop_min <= self.gdop_max) {
            return Err(AtriumError::configuration(
                "triangulation GDOP bounds must satisfy 0 < min <= max",
            ));
        }
        if !(self.rssi_variance_scale > 0.0
            && self.reference_area_m2 > 0.0
            && self.accuracy_cap_m > 0.0)
        {
            return Err(AtriumError::configuration(
                "triangulation scales and caps must be positive",
            ));
        }
        Ok(())
    }
}

/// One observation matched to a registered beacon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedObservation {
    /// Registered beacon
    pub beacon_id: BeaconId,
    /// Observed RSSI
    pub rssi: f64,
    /// Estimated distance to the beacon
    pub distance: Option<f64>,
    /// Proximity class
    pub zone: ProximityZone,
    /// Solve weight
    pub weight: f64,
}

/// Outcome of one triangulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangulationResult {
    /// Solved position
    pub point: Point,
    /// Estimated accuracy in meters
    pub accuracy: f64,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    /// Number of matched observations
    pub beacons_used: usize,
    /// Matched observations in scan order
    pub matched: Vec<MatchedObservation>,
    /// Weight-majority building among matched beacons
    pub building: BuildingId,
    /// Weight-majority floor among matched beacons
    pub floor: i32,
}

impl TriangulationResult {
    /// Floor and building suggestion for spatial resolution.
    pub fn floor_hint(&self) -> FloorHint {
        FloorHint {
            building: self.building.clone(),
            floor: self.floor,
        }
    }
}

/// Observation weight from signal strength and claimed accuracy.
pub fn observation_weight(rssi: f64, accuracy: f64) -> f64 {
    let rssi_weight = ((rssi + 100.0) / 100.0).max(0.1);
    let accuracy_weight = (1.0 / (accuracy + 1.0)).max(0.1);
    rssi_weight * accuracy_weight
}

/// Beacon scan solver over the current registry snapshot.
#[derive(Clone)]
pub struct TriangulationEngine {
    registry: Arc<BeaconRegistryStore>,
    config: TriangulationConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TriangulationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriangulationEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TriangulationEngine {
    /// Create an engine over `registry`.
    pub fn new(
        registry: Arc<BeaconRegistryStore>,
        config: TriangulationConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            config,
            clock,
        }
    }

    /// Registry backing this engine.
    pub fn registry(&self) -> &Arc<BeaconRegistryStore> {
        &self.registry
    }

    /// Solve a position from one scan.
    ///
    /// Observations with an RSSI of zero carry no reading and are ignored, as
    /// are repeats of a beacon already matched and beacons that are not
    /// active. Fewer than `min_beacons` matches is an error.
    pub fn triangulate(
        &self,
        observations: &[BeaconObservation],
    ) -> AtriumResult<TriangulationResult> {
        for obs in observations {
            if !obs.rssi.is_finite() || !(obs.accuracy.is_finite() && obs.accuracy >= 0.0) {
                return Err(AtriumError::invalid_input(
                    "beacon observations need finite rssi and non-negative accuracy",
                ));
            }
        }

        let registry = self.registry.snapshot();
        let mut seen = HashSet::new();
        let matched: Vec<(&Beacon, &BeaconObservation)> = observations
            .iter()
            .filter(|obs| obs.rssi != 0.0)
            .filter_map(|obs| registry.lookup_active(&obs.identity).map(|b| (b, obs)))
            .filter(|(b, _)| seen.insert(b.id.clone()))
            .collect();

        if matched.len() < self.config.min_beacons {
            tracing::debug!(
                observed = observations.len(),
                matched = matched.len(),
                "Insufficient beacons for triangulation"
            );
            return Err(AtriumError::insufficient_beacons(
                matched.len(),
                self.config.min_beacons,
            ));
        }

        let used: Vec<MatchedObservation> = matched
            .iter()
            .map(|(beacon, obs)| MatchedObservation {
                beacon_id: beacon.id.clone(),
                rssi: obs.rssi,
                distance: beacon.estimate_distance(obs.rssi),
                zone: beacon.proximity_zone(obs.rssi),
                weight: observation_weight(obs.rssi, obs.accuracy),
            })
            .collect();

        let point = Point::weighted_mean(
            matched
                .iter()
                .zip(&used)
                .map(|((beacon, _), m)| (beacon.point, m.weight)),
        )
        .ok_or_else(|| AtriumError::insufficient_beacons(0, self.config.min_beacons))?;

        let confidence = self.confidence(&matched);
        let accuracy = self.accuracy(&matched);
        let (building, floor) = dominant_placement(&matched, &used)
            .ok_or_else(|| AtriumError::insufficient_beacons(0, self.config.min_beacons))?;

        self.registry
            .touch(used.iter().map(|m| &m.beacon_id), self.clock.now());

        tracing::debug!(
            beacons_used = used.len(),
            accuracy,
            confidence,
            building = %building,
            floor,
            "Triangulated position"
        );

        Ok(TriangulationResult {
            point,
            accuracy,
            confidence,
            beacons_used: used.len(),
            matched: used,
            building,
            floor,
        })
    }

    fn confidence(&self, matched: &[(&Beacon, &BeaconObservation)]) -> f64 {
        let n = matched.len() as f64;
        let count_score = (n / self.config.saturation_beacons as f64).min(1.0);
        let mean = matched.iter().map(|(_, o)| o.rssi).sum::<f64>() / n;
        let variance = matched
            .iter()
            .map(|(_, o)| (o.rssi - mean).powi(2))
            .sum::<f64>()
            / n;
        let consistency_score = (1.0 - variance / self.config.rssi_variance_scale).max(0.0);
        (count_score + consistency_score) / 2.0
    }

    fn accuracy(&self, matched: &[(&Beacon, &BeaconObservation)]) -> f64 {
        let mean_accuracy =
            matched.iter().map(|(_, o)| o.accuracy).sum::<f64>() / matched.len() as f64;
        (mean_accuracy * self.gdop(matched)).min(self.config.accuracy_cap_m)
    }

    /// Larger triangle, tighter factor.
    fn gdop(&self, matched: &[(&Beacon, &BeaconObservation)]) -> f64 {
        match matched {
            [a, b, c, ..] => {
                let area = triangle_area(&a.0.point, &b.0.point, &c.0.point);
                (self.config.reference_area_m2 / (area + 1.0))
                    .clamp(self.config.gdop_min, self.config.gdop_max)
            }
            _ => self.config.gdop_max,
        }
    }
}

/// Building and floor carrying the largest total weight; first seen wins ties.
fn dominant_placement(
    matched: &[(&Beacon, &BeaconObservation)],
    observations: &[MatchedObservation],
) -> Option<(BuildingId, i32)> {
    let mut totals: Vec<((&BuildingId, i32), f64)> = Vec::new();
    for ((beacon, _), m) in matched.iter().zip(observations) {
        let key = (&beacon.building, beacon.floor);
        match totals.iter_mut().find(|(k, _)| *k == key) {
            Some((_, w)) => *w += m.weight,
            None => totals.push((key, m.weight)),
        }
    }
    totals
        .into_iter()
        .fold(None, |best: Option<((&BuildingId, i32), f64)>, entry| match best {
            Some(b) if b.1 >= entry.1 => Some(b),
            _ => Some(entry),
        })
        .map(|((building, floor), _)| (building.clone(), floor))
}

//! Tracking configuration

use crate::geofence::Geofence;
use atrium_core::{time::duration_secs, AtriumError, AtriumResult, GeofenceId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Session tracker tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Maximum fixes retained per user
    pub history_max_len: usize,
    /// Fixes older than this are evicted and excluded from default queries
    #[serde(with = "duration_secs")]
    pub history_max_age: Duration,
    /// Look-back window for the prolonged-stay check
    #[serde(with = "duration_secs")]
    pub prolonged_stay_window: Duration,
    /// Radius around the current fix counted as staying put
    pub prolonged_stay_radius_m: f64,
    /// Fixes within the radius needed to report a stay
    pub prolonged_stay_min_fixes: usize,
    /// Period of the per-session re-evaluation
    #[serde(with = "duration_secs")]
    pub evaluation_interval: Duration,
    /// Geofences checked on every accepted fix
    pub geofences: Vec<Geofence>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            history_max_len: 100,
            history_max_age: Duration::from_secs(24 * 60 * 60),
            prolonged_stay_window: Duration::from_secs(5 * 60),
            prolonged_stay_radius_m: 10.0,
            prolonged_stay_min_fixes: 10,
            evaluation_interval: Duration::from_secs(5),
            geofences: Vec::new(),
        }
    }
}

impl TrackingConfig {
    /// Defaults with the given geofences.
    pub fn with_geofences(geofences: Vec<Geofence>) -> Self {
        Self {
            geofences,
            ..Self::default()
        }
    }

    /// Reject nonsensical values.
    pub fn validate(&self) -> AtriumResult<()> {
        if self.history_max_len == 0 {
            return Err(AtriumError::configuration(
                "tracking.history_max_len must be positive",
            ));
        }
        if self.evaluation_interval.is_zero() {
            return Err(AtriumError::configuration(
                "tracking.evaluation_interval must be positive",
            ));
        }
        if self.prolonged_stay_min_fixes == 0 || !(self.prolonged_stay_radius_m >= 0.0) {
            return Err(AtriumError::configuration(
                "tracking prolonged-stay thresholds must be positive",
            ));
        }
        let mut ids: HashSet<&GeofenceId> = HashSet::new();
        for geofence in &self.geofences {
            if !ids.insert(&geofence.id) {
                return Err(AtriumError::configuration(format!(
                    "duplicate geofence id {}",
                    geofence.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_core::Point;

    #[test]
    fn test_defaults_validate() {
        assert!(TrackingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_duplicate_geofences_rejected() {
        let fence = Geofence::circle("a", "A", Point::new(0.0, 0.0), 5.0);
        let config = TrackingConfig::with_geofences(vec![fence.clone(), fence]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: TrackingConfig = toml::from_str("evaluation_interval = 2.5").unwrap();
        assert_eq!(config.evaluation_interval, Duration::from_millis(2500));
        assert_eq!(config.history_max_len, 100);
    }
}

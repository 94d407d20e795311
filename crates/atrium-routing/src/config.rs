//! Routing configuration

use atrium_core::{AtriumError, AtriumResult};
use serde::{Deserialize, Serialize};

/// Tunables for nearest-node lookup and route assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Maximum distance between a requested point and its nearest node
    pub max_search_radius_m: f64,
    /// Fixed wait added once per elevator edge when estimating time
    pub elevator_wait_secs: f64,
    /// Upper bound on expanded nodes per search
    pub max_expansions: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_search_radius_m: 50.0,
            elevator_wait_secs: 20.0,
            max_expansions: 100_000,
        }
    }
}

impl RoutingConfig {
    /// Configuration for tests: no elevator dwell so times are pure distance/speed.
    pub fn testing() -> Self {
        Self {
            elevator_wait_secs: 0.0,
            ..Self::default()
        }
    }

    /// Reject nonsensical values.
    pub fn validate(&self) -> AtriumResult<()> {
        if !(self.max_search_radius_m.is_finite() && self.max_search_radius_m > 0.0) {
            return Err(AtriumError::configuration(
                "routing.max_search_radius_m must be positive",
            ));
        }
        if !(self.elevator_wait_secs.is_finite() && self.elevator_wait_secs >= 0.0) {
            return Err(AtriumError::configuration(
                "routing.elevator_wait_secs must not be negative",
            ));
        }
        if self.max_expansions == 0 {
            return Err(AtriumError::configuration(
                "routing.max_expansions must be at least 1",
            ));
        }
        Ok(())
    }
}

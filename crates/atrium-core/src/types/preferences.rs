//! Routing cost policy

use serde::{Deserialize, Serialize};

/// Walking speed class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkingSpeed {
    /// 1.0 m/s
    Slow,
    /// 1.4 m/s
    #[default]
    Normal,
    /// 1.8 m/s
    Fast,
}

impl WalkingSpeed {
    /// Speed in meters per second.
    pub fn meters_per_second(self) -> f64 {
        match self {
            Self::Slow => 1.0,
            Self::Normal => 1.4,
            Self::Fast => 1.8,
        }
    }
}

/// Per-user routing preferences.
///
/// `accessible_only` and `avoid_stairs` are hard filters applied while
/// enumerating neighbors; `prefer_elevator` only reorders candidates;
/// the walking speed only converts distance to time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    /// Exclude stair edges
    pub avoid_stairs: bool,
    /// Try elevator edges first among equal candidates
    pub prefer_elevator: bool,
    /// Exclude non-accessible edges
    pub accessible_only: bool,
    /// Speed used for time estimates
    pub preferred_walking_speed: WalkingSpeed,
}

impl UserPreferences {
    /// Walking speed in meters per second.
    pub fn walking_speed_mps(&self) -> f64 {
        self.preferred_walking_speed.meters_per_second()
    }
}

//! Physical time effect
//!
//! Windows such as the 30 s filter window or the 5 min prolonged-stay window
//! are evaluated against an injected clock so tests can drive time manually.

use chrono::{DateTime, Utc};

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Serde adapter storing a `Duration` as fractional seconds.
///
/// Used by the configuration structs so TOML files can write `window_max_age = 30`.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as seconds.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    /// Deserialize from non-negative seconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Convert a std duration into a chrono one, saturating on overflow.
pub fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct Window {
        #[serde(with = "duration_secs")]
        max_age: Duration,
    }

    #[test]
    fn test_duration_secs_round_trip() {
        let w: Window = toml::from_str("max_age = 2.5").unwrap();
        assert_eq!(w.max_age, Duration::from_millis(2500));
        assert!(toml::from_str::<Window>("max_age = -1").is_err());
    }

    #[test]
    fn test_to_chrono() {
        assert_eq!(to_chrono(Duration::from_secs(30)), chrono::Duration::seconds(30));
    }
}

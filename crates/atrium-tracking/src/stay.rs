//! Prolonged-stay detection
//!
//! A stay is reported when at least `min_fixes` retained fixes from the
//! look-back window lie within `radius_m` of the current fix. The detector
//! is edge triggered: it reports once when the condition becomes true and
//! re-arms only after the condition has been observed false.

use atrium_core::UserLocation;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;

/// A detected stay.
#[derive(Debug, Clone, PartialEq)]
pub struct Stay {
    /// Fix the stay was measured around
    pub location: UserLocation,
    /// Qualifying fixes in the window
    pub fixes: usize,
    /// Time since the oldest qualifying fix
    pub duration: Duration,
}

/// Debounced stay detector for one session.
#[derive(Debug, Clone, Default)]
pub struct StayDetector {
    reported_at: Option<DateTime<Utc>>,
}

impl StayDetector {
    /// Whether a stay has been reported and not yet re-armed.
    pub fn is_latched(&self) -> bool {
        self.reported_at.is_some()
    }

    /// Evaluate the condition, returning a stay only on a rising edge.
    pub fn check(
        &mut self,
        history: &VecDeque<UserLocation>,
        now: DateTime<Utc>,
        window: Duration,
        radius_m: f64,
        min_fixes: usize,
    ) -> Option<Stay> {
        let Some(current) = history.back() else {
            self.reported_at = None;
            return None;
        };
        let cutoff = now - atrium_core::time::to_chrono(window);
        let nearby: Vec<&UserLocation> = history
            .iter()
            .filter(|fix| fix.timestamp >= cutoff)
            .filter(|fix| fix.point.distance_to(&current.point) <= radius_m)
            .collect();

        if nearby.len() < min_fixes {
            self.reported_at = None;
            return None;
        }
        if self.reported_at.is_some() {
            return None;
        }
        self.reported_at = Some(now);
        let since = nearby
            .iter()
            .map(|fix| fix.timestamp)
            .min()
            .unwrap_or(current.timestamp);
        Some(Stay {
            location: current.clone(),
            fixes: nearby.len(),
            duration: (now - since).to_std().unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_core::{BuildingId, LocationSource, Point};
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn fix(x: f64, secs: i64) -> UserLocation {
        UserLocation {
            point: Point::new(x, 0.0),
            floor: 1,
            building: BuildingId::new("main"),
            accuracy: 1.0,
            source: LocationSource::Manual,
            timestamp: t(secs),
        }
    }

    const WINDOW: Duration = Duration::from_secs(300);

    #[test]
    fn test_fires_once_while_condition_holds() {
        let mut detector = StayDetector::default();
        let mut history = VecDeque::new();
        let mut fired = 0;
        for i in 0..20 {
            history.push_back(fix(1.0, i * 10));
            if detector.check(&history, t(i * 10), WINDOW, 10.0, 10).is_some() {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
        assert!(detector.is_latched());
    }

    #[test]
    fn test_rearms_after_leaving() {
        let mut detector = StayDetector::default();
        let mut history: VecDeque<_> = (0..10).map(|i| fix(0.0, i)).collect();
        let stay = detector.check(&history, t(9), WINDOW, 10.0, 10).unwrap();
        assert_eq!(stay.fixes, 10);
        assert_eq!(stay.duration, Duration::from_secs(9));

        history.push_back(fix(100.0, 10));
        assert!(detector.check(&history, t(10), WINDOW, 10.0, 10).is_none());
        assert!(!detector.is_latched());

        history.push_back(fix(0.0, 11));
        assert!(detector.check(&history, t(11), WINDOW, 10.0, 10).is_some());
    }

    #[test]
    fn test_old_fixes_do_not_count() {
        let mut detector = StayDetector::default();
        let history: VecDeque<_> = (0..10).map(|i| fix(0.0, i)).collect();
        assert!(detector
            .check(&history, t(9 + 600), WINDOW, 10.0, 10)
            .is_none());
    }
}

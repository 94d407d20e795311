//! Per-user session state

use crate::config::TrackingConfig;
use crate::geofence::GeofenceMembership;
use crate::stay::{Stay, StayDetector};
use crate::timer::SessionTimer;
use atrium_core::UserLocation;
use atrium_positioning::FilterWindow;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Everything one tracked user owns. Guarded by one async mutex.
#[derive(Debug)]
pub(crate) struct UserSession {
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) history: VecDeque<UserLocation>,
    pub(crate) window: FilterWindow,
    pub(crate) membership: GeofenceMembership,
    pub(crate) stay: StayDetector,
    timer: Option<SessionTimer>,
    closed: bool,
}

impl UserSession {
    pub(crate) fn new(started_at: DateTime<Utc>, timer: SessionTimer) -> Self {
        Self {
            started_at,
            history: VecDeque::new(),
            window: FilterWindow::new(),
            membership: GeofenceMembership::default(),
            stay: StayDetector::default(),
            timer: Some(timer),
            closed: false,
        }
    }

    /// Set once the session has been stopped; late updates must not apply.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn current(&self) -> Option<&UserLocation> {
        self.history.back()
    }

    /// Append an accepted fix and evict stale or excess entries.
    pub(crate) fn record(
        &mut self,
        location: UserLocation,
        now: DateTime<Utc>,
        config: &TrackingConfig,
    ) {
        self.history.push_back(location);
        let cutoff = now - atrium_core::time::to_chrono(config.history_max_age);
        while self.history.front().map_or(false, |f| f.timestamp < cutoff) {
            self.history.pop_front();
        }
        while self.history.len() > config.history_max_len {
            self.history.pop_front();
        }
    }

    pub(crate) fn check_stay(&mut self, now: DateTime<Utc>, config: &TrackingConfig) -> Option<Stay> {
        self.stay.check(
            &self.history,
            now,
            config.prolonged_stay_window,
            config.prolonged_stay_radius_m,
            config.prolonged_stay_min_fixes,
        )
    }

    pub(crate) fn since(&self, cutoff: DateTime<Utc>) -> Vec<UserLocation> {
        self.history
            .iter()
            .filter(|f| f.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Cancel the timer and hand back the history. Idempotent.
    pub(crate) fn close(&mut self) -> Vec<UserLocation> {
        self.closed = true;
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.history.drain(..).collect()
    }

    #[cfg(test)]
    pub(crate) fn has_timer(&self) -> bool {
        self.timer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_core::{BuildingId, LocationSource, Point};
    use std::time::Duration;
    use tokio::runtime::Handle;

    fn fix(secs: i64, base: DateTime<Utc>) -> UserLocation {
        UserLocation {
            point: Point::new(0.0, 0.0),
            floor: 1,
            building: BuildingId::new("main"),
            accuracy: 1.0,
            source: LocationSource::Manual,
            timestamp: base + chrono::Duration::seconds(secs),
        }
    }

    fn idle_timer() -> SessionTimer {
        SessionTimer::spawn(&Handle::current(), Duration::from_secs(3600), || async {})
    }

    #[tokio::test]
    async fn test_history_bounded_by_length_and_age() {
        let base = Utc::now();
        let mut session = UserSession::new(base, idle_timer());
        let config = TrackingConfig {
            history_max_len: 3,
            history_max_age: Duration::from_secs(60),
            ..TrackingConfig::default()
        };
        for i in 0..5 {
            session.record(fix(i, base), base + chrono::Duration::seconds(i), &config);
        }
        assert_eq!(session.history.len(), 3);

        let later = base + chrono::Duration::seconds(120);
        session.record(fix(120, base), later, &config);
        assert_eq!(session.history.len(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let base = Utc::now();
        let mut session = UserSession::new(base, idle_timer());
        session.record(fix(0, base), base, &TrackingConfig::default());
        assert_eq!(session.close().len(), 1);
        assert!(session.is_closed());
        assert!(!session.has_timer());
        assert!(session.close().is_empty());
    }
}

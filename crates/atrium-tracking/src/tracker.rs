//! Session tracker
//!
//! Owns one [`UserSession`] per tracked user behind its own async mutex. The
//! outer map only addresses sessions and is never held across an await, so
//! users never contend with each other.
//!
//! Every accepted fix is processed under the session lock in a fixed order:
//! smoothing, history append, geofence transitions, prolonged-stay check.
//! Beacon-derived fixes are resolved to a building and floor before that
//! sequence starts so the history only holds resolved placements.

use crate::config::TrackingConfig;
use crate::events::{TrackingEvent, TrackingEventSink};
use crate::geofence::Crossing;
use crate::session::UserSession;
use crate::timer::SessionTimer;
use atrium_core::{
    AnalyticsEvent, AnalyticsSink, ArchiveSink, AtriumError, AtriumResult, BuildingId, Clock,
    LocationSource, Point, ResolvedPlacement, SpatialResolver, UserId, UserLocation,
};
use atrium_positioning::{LocationFilter, TriangulationResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Mutex;

/// A location reported directly by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualFix {
    /// Reported position
    pub point: Point,
    /// Reported floor
    pub floor: i32,
    /// Reported building
    pub building: BuildingId,
    /// Claimed accuracy in meters
    pub accuracy: f64,
    /// Fix origin
    pub source: LocationSource,
}

/// Another tracked user near the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyUser {
    /// The other user
    pub user: UserId,
    /// Their current location
    pub location: UserLocation,
    /// Planar distance in meters
    pub distance: f64,
}

/// External collaborators used by the tracker.
#[derive(Clone)]
pub struct TrackerEffects {
    /// Building and floor resolution
    pub spatial: Arc<dyn SpatialResolver>,
    /// History hand-off on stop
    pub archive: Arc<dyn ArchiveSink>,
    /// Analytics events
    pub analytics: Arc<dyn AnalyticsSink>,
    /// Per-user transition events
    pub events: Arc<dyn TrackingEventSink>,
}

/// State shared with the session timers.
#[derive(Clone)]
struct Shared {
    config: Arc<TrackingConfig>,
    clock: Arc<dyn Clock>,
    analytics: Arc<dyn AnalyticsSink>,
    events: Arc<dyn TrackingEventSink>,
}

/// Tracking session manager.
pub struct SessionTracker {
    sessions: RwLock<HashMap<UserId, Arc<Mutex<UserSession>>>>,
    /// Outlives sessions; stale entries of untracked users are pruned on stop
    last_known: RwLock<HashMap<UserId, UserLocation>>,
    filter: LocationFilter,
    spatial: Arc<dyn SpatialResolver>,
    archive: Arc<dyn ArchiveSink>,
    shared: Shared,
}

impl std::fmt::Debug for SessionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTracker")
            .field("active_sessions", &self.sessions.read().len())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl SessionTracker {
    /// Create a tracker.
    pub fn new(
        config: TrackingConfig,
        filter: LocationFilter,
        clock: Arc<dyn Clock>,
        effects: TrackerEffects,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            last_known: RwLock::new(HashMap::new()),
            filter,
            spatial: effects.spatial,
            archive: effects.archive,
            shared: Shared {
                config: Arc::new(config),
                clock,
                analytics: effects.analytics,
                events: effects.events,
            },
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &TrackingConfig {
        &self.shared.config
    }

    /// Start a session and its evaluation timer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_tracking(&self, user: &UserId) -> AtriumResult<()> {
        let runtime = Handle::try_current()
            .map_err(|_| AtriumError::configuration("session timers need a Tokio runtime"))?;

        let mut sessions = self.sessions.write();
        if sessions.contains_key(user) {
            return Err(AtriumError::AlreadyTracking(user.clone()));
        }

        let started_at = self.shared.clock.now();
        let session = Arc::new_cyclic(|weak: &Weak<Mutex<UserSession>>| {
            let timer = spawn_evaluation(
                &runtime,
                self.shared.clone(),
                user.clone(),
                weak.clone(),
            );
            Mutex::new(UserSession::new(started_at, timer))
        });
        sessions.insert(user.clone(), session);

        tracing::info!(
            user_id = %user,
            interval_secs = self.shared.config.evaluation_interval.as_secs_f64(),
            "Tracking started"
        );
        Ok(())
    }

    /// Stop a session: cancel its timer, archive its history, then discard it.
    ///
    /// Returns the number of archived fixes. The session is gone even when
    /// the archive rejects the hand-off.
    pub async fn stop_tracking(&self, user: &UserId) -> AtriumResult<usize> {
        let session = self
            .sessions
            .write()
            .remove(user)
            .ok_or_else(|| AtriumError::NotTracking(user.clone()))?;

        let (history, started_at) = {
            let mut session = session.lock().await;
            (session.close(), session.started_at)
        };
        let records = history.len();
        let tracked_secs = (self.shared.clock.now() - started_at).num_seconds();
        self.prune_last_known();

        if let Err(err) = self.archive.archive(user, history).await {
            tracing::error!(user_id = %user, records, error = %err, "History archive failed");
            return Err(err);
        }
        tracing::info!(user_id = %user, records, tracked_secs, "Tracking stopped");
        Ok(records)
    }

    /// Stop every active session.
    pub async fn stop_all(&self) {
        for user in self.active_users() {
            if let Err(err) = self.stop_tracking(&user).await {
                tracing::warn!(user_id = %user, error = %err, "Failed to stop session");
            }
        }
    }

    /// Whether `user` has an active session.
    pub fn is_tracking(&self, user: &UserId) -> bool {
        self.sessions.read().contains_key(user)
    }

    /// Users with active sessions, sorted.
    pub fn active_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.sessions.read().keys().cloned().collect();
        users.sort();
        users
    }

    /// Last accepted fix for `user`, surviving the end of the session.
    pub fn current_location(&self, user: &UserId) -> Option<UserLocation> {
        self.last_known.read().get(user).cloned()
    }

    /// Apply a client-reported fix.
    pub async fn update_manual(&self, user: &UserId, fix: ManualFix) -> AtriumResult<UserLocation> {
        if !(fix.point.x.is_finite() && fix.point.y.is_finite()) {
            return Err(AtriumError::invalid_input("coordinates must be finite"));
        }
        if !(fix.accuracy.is_finite() && fix.accuracy >= 0.0) {
            return Err(AtriumError::invalid_input(
                "accuracy must be a non-negative number",
            ));
        }
        let location = UserLocation {
            point: fix.point,
            floor: fix.floor,
            building: fix.building,
            accuracy: fix.accuracy,
            source: fix.source,
            timestamp: self.shared.clock.now(),
        };
        self.accept(user, location).await
    }

    /// Apply a beacon triangulation, resolving its building and floor first.
    ///
    /// The beacons' weight-majority placement is the hint; it is used as-is
    /// when the resolver has no answer or fails.
    pub async fn update_from_triangulation(
        &self,
        user: &UserId,
        result: &TriangulationResult,
    ) -> AtriumResult<UserLocation> {
        if !self.is_tracking(user) {
            return Err(AtriumError::NotTracking(user.clone()));
        }
        let hint = result.floor_hint();
        let placement = match self.spatial.resolve(result.point, Some(&hint)).await {
            Ok(Some(placement)) => placement,
            Ok(None) => ResolvedPlacement::from(hint),
            Err(err) => {
                tracing::warn!(user_id = %user, error = %err, "Spatial resolution failed, using beacon placement");
                ResolvedPlacement::from(hint)
            }
        };
        let location = UserLocation {
            point: result.point,
            floor: placement.floor,
            building: placement.building,
            accuracy: result.accuracy,
            source: LocationSource::Beacon,
            timestamp: self.shared.clock.now(),
        };
        self.accept(user, location).await
    }

    /// Retained fixes newer than `max_age` (default: the retention age), oldest first.
    pub async fn history(
        &self,
        user: &UserId,
        max_age: Option<Duration>,
    ) -> AtriumResult<Vec<UserLocation>> {
        let session = self.session(user)?;
        let max_age = max_age.unwrap_or(self.shared.config.history_max_age);
        let cutoff = self.shared.clock.now() - atrium_core::time::to_chrono(max_age);
        let session = session.lock().await;
        Ok(session.since(cutoff))
    }

    /// Other tracked users on the caller's building and floor within `radius_m`, nearest first.
    pub fn nearby_users(&self, user: &UserId, radius_m: f64) -> AtriumResult<Vec<NearbyUser>> {
        let origin = self
            .current_location(user)
            .ok_or_else(|| AtriumError::UnknownUser(user.clone()))?;
        let sessions = self.sessions.read();
        let last_known = self.last_known.read();
        let mut nearby: Vec<NearbyUser> = last_known
            .iter()
            .filter(|(other, _)| *other != user && sessions.contains_key(*other))
            .filter(|(_, location)| location.same_area(&origin))
            .map(|(other, location)| NearbyUser {
                user: other.clone(),
                location: location.clone(),
                distance: location.distance_to(&origin),
            })
            .filter(|n| n.distance <= radius_m)
            .collect();
        nearby.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.user.cmp(&b.user)));
        Ok(nearby)
    }

    /// Run the periodic evaluation for `user` immediately.
    pub async fn evaluate_now(&self, user: &UserId) -> AtriumResult<()> {
        let session = self.session(user)?;
        evaluate(&self.shared, user, &session).await;
        Ok(())
    }

    /// Forget last known locations of untracked users older than the
    /// history retention.
    fn prune_last_known(&self) {
        let retention = atrium_core::time::to_chrono(self.shared.config.history_max_age);
        let cutoff = self.shared.clock.now() - retention;
        let active: HashSet<UserId> = self.sessions.read().keys().cloned().collect();
        let mut last_known = self.last_known.write();
        let before = last_known.len();
        last_known.retain(|user, location| active.contains(user) || location.timestamp >= cutoff);
        let pruned = before - last_known.len();
        if pruned > 0 {
            tracing::debug!(pruned, remaining = last_known.len(), "Pruned stale last known locations");
        }
    }

    fn session(&self, user: &UserId) -> AtriumResult<Arc<Mutex<UserSession>>> {
        self.sessions
            .read()
            .get(user)
            .cloned()
            .ok_or_else(|| AtriumError::NotTracking(user.clone()))
    }

    async fn accept(&self, user: &UserId, fix: UserLocation) -> AtriumResult<UserLocation> {
        let session = self.session(user)?;
        let config = &self.shared.config;
        let events = &self.shared.events;

        let accepted = {
            let mut guard = session.lock().await;
            if guard.is_closed() {
                return Err(AtriumError::NotTracking(user.clone()));
            }
            let session = &mut *guard;
            let now = self.shared.clock.now();

            let accepted = self.filter.apply(&mut session.window, fix, now);
            session.record(accepted.clone(), now, config);

            for (crossing, geofence) in session.membership.update(&config.geofences, &accepted) {
                let event = match crossing {
                    Crossing::Enter => TrackingEvent::enter(geofence, &accepted),
                    Crossing::Exit => TrackingEvent::exit(geofence, &accepted),
                };
                tracing::info!(user_id = %user, geofence_id = %geofence.id, event = event.kind(), "Geofence transition");
                events.emit(user, event);
            }

            if let Some(stay) = session.check_stay(now, config) {
                tracing::info!(user_id = %user, fixes = stay.fixes, "Prolonged stay detected");
                events.emit(user, TrackingEvent::stay(stay));
            }
            accepted
        };

        self.last_known
            .write()
            .insert(user.clone(), accepted.clone());

        tracing::debug!(
            user_id = %user,
            source = ?accepted.source,
            building = %accepted.building,
            floor = accepted.floor,
            accuracy = accepted.accuracy,
            "Location accepted"
        );

        record_analytics(
            &self.shared,
            AnalyticsEvent::LocationUpdate {
                user: user.clone(),
                location: accepted.clone(),
            },
        )
        .await;
        Ok(accepted)
    }
}

fn spawn_evaluation(
    runtime: &Handle,
    shared: Shared,
    user: UserId,
    session: Weak<Mutex<UserSession>>,
) -> SessionTimer {
    let interval = shared.config.evaluation_interval;
    SessionTimer::spawn(runtime, interval, move || {
        let shared = shared.clone();
        let user = user.clone();
        let session = session.clone();
        async move {
            if let Some(session) = session.upgrade() {
                evaluate(&shared, &user, &session).await;
            }
        }
    })
}

/// Re-check the prolonged stay and record a location sample.
async fn evaluate(shared: &Shared, user: &UserId, session: &Mutex<UserSession>) {
    let current = {
        let mut session = session.lock().await;
        if session.is_closed() {
            return;
        }
        let Some(current) = session.current().cloned() else {
            return;
        };
        if let Some(stay) = session.check_stay(shared.clock.now(), &shared.config) {
            tracing::info!(user_id = %user, fixes = stay.fixes, "Prolonged stay detected");
            shared.events.emit(user, TrackingEvent::stay(stay));
        }
        current
    };

    record_analytics(
        shared,
        AnalyticsEvent::LocationAnalytics {
            user: user.clone(),
            building: current.building,
            floor: current.floor,
            source: current.source,
            accuracy: current.accuracy,
            timestamp: current.timestamp,
        },
    )
    .await;
}

async fn record_analytics(shared: &Shared, event: AnalyticsEvent) {
    let kind = event.kind();
    if let Err(err) = shared.analytics.record(event).await {
        tracing::warn!(kind, error = %err, "Analytics event dropped");
    }
}

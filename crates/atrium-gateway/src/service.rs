//! Navigator service
//!
//! The protocol-agnostic request surface: route computation, manual and
//! beacon location updates, tracking lifecycle. The realtime gateway is one
//! caller; anything else embedding the crate can call it directly.

use atrium_core::{
    AnalyticsEvent, AnalyticsSink, AtriumResult, BeaconObservation, PreferencesStore, Route,
    UserId, UserLocation, UserPreferences,
};
use atrium_positioning::{TriangulationEngine, TriangulationResult};
use atrium_routing::{PathfindingEngine, RouteEndpoint};
use atrium_tracking::{ManualFix, SessionTracker};
use std::sync::Arc;

/// Request facade over routing, positioning and tracking.
#[derive(Clone)]
pub struct NavigatorService {
    routing: PathfindingEngine,
    triangulation: TriangulationEngine,
    tracker: Arc<SessionTracker>,
    preferences: Arc<dyn PreferencesStore>,
    analytics: Arc<dyn AnalyticsSink>,
}

impl std::fmt::Debug for NavigatorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigatorService")
            .field("routing", &self.routing)
            .field("triangulation", &self.triangulation)
            .finish_non_exhaustive()
    }
}

impl NavigatorService {
    /// Assemble the service.
    pub fn new(
        routing: PathfindingEngine,
        triangulation: TriangulationEngine,
        tracker: Arc<SessionTracker>,
        preferences: Arc<dyn PreferencesStore>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Self {
        Self {
            routing,
            triangulation,
            tracker,
            preferences,
            analytics,
        }
    }

    /// Route engine.
    pub fn routing(&self) -> &PathfindingEngine {
        &self.routing
    }

    /// Triangulation engine.
    pub fn triangulation(&self) -> &TriangulationEngine {
        &self.triangulation
    }

    /// Session tracker.
    pub fn tracker(&self) -> &Arc<SessionTracker> {
        &self.tracker
    }

    /// Compute a route.
    ///
    /// Without explicit preferences the requesting user's stored preferences
    /// apply, falling back to defaults. Routes computed for a user are
    /// recorded as `route_request` analytics.
    pub async fn compute_route(
        &self,
        user: Option<&UserId>,
        from: &RouteEndpoint,
        to: &RouteEndpoint,
        preferences: Option<UserPreferences>,
    ) -> AtriumResult<Route> {
        let preferences = match (preferences, user) {
            (Some(explicit), _) => explicit,
            (None, Some(user)) => self.stored_preferences(user).await,
            (None, None) => UserPreferences::default(),
        };

        let route = self.routing.compute_route(from, to, &preferences)?;

        if let Some(user) = user {
            let event = AnalyticsEvent::RouteRequest {
                user: user.clone(),
                route_id: route.id.clone(),
                distance: route.total_distance,
                estimated_time: route.estimated_time,
                accessible: route.accessible,
            };
            if let Err(err) = self.analytics.record(event).await {
                tracing::warn!(user_id = %user, error = %err, "Route analytics dropped");
            }
        }
        Ok(route)
    }

    async fn stored_preferences(&self, user: &UserId) -> UserPreferences {
        match self.preferences.preferences(user).await {
            Ok(found) => found.unwrap_or_default(),
            Err(err) => {
                tracing::warn!(user_id = %user, error = %err, "Preferences lookup failed, using defaults");
                UserPreferences::default()
            }
        }
    }

    /// Apply a client-reported fix.
    pub async fn update_location_manual(
        &self,
        user: &UserId,
        fix: ManualFix,
    ) -> AtriumResult<UserLocation> {
        self.tracker.update_manual(user, fix).await
    }

    /// Triangulate a scan and apply the result.
    pub async fn update_location_from_beacons(
        &self,
        user: &UserId,
        observations: &[BeaconObservation],
    ) -> AtriumResult<(UserLocation, TriangulationResult)> {
        let result = self.triangulation.triangulate(observations)?;
        let location = self
            .tracker
            .update_from_triangulation(user, &result)
            .await?;
        Ok((location, result))
    }

    /// Start tracking a user.
    pub fn start_tracking(&self, user: &UserId) -> AtriumResult<()> {
        self.tracker.start_tracking(user)
    }

    /// Stop tracking a user, archiving their history.
    pub async fn stop_tracking(&self, user: &UserId) -> AtriumResult<usize> {
        self.tracker.stop_tracking(user).await
    }
}

//! Collaborator effects
//!
//! The core consumes four external collaborators (spatial resolution, user
//! preferences, authentication, archival) plus an analytics sink. Each is a
//! trait so deployments can plug in their own stores; the adapters in this
//! module cover single-process deployments and tests.

mod auth;
mod preferences;
mod sinks;
mod spatial;

pub use auth::{HmacTokenVerifier, StaticTokenVerifier};
pub use preferences::InMemoryPreferences;
pub use sinks::{TracingAnalyticsSink, TracingArchiveSink};
pub use spatial::{BuildingFootprint, BuildingFootprints};

use crate::error::AtriumResult;
use crate::geometry::Point;
use crate::ids::{BuildingId, RouteId, UserId};
use crate::types::{LocationSource, UserLocation, UserPreferences};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Floor and building suggested by the fix source (e.g. the matched beacons).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorHint {
    /// Suggested building
    pub building: BuildingId,
    /// Suggested floor
    pub floor: i32,
}

/// Building and floor a point resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPlacement {
    /// Resolved building
    pub building: BuildingId,
    /// Resolved floor
    pub floor: i32,
}

impl From<FloorHint> for ResolvedPlacement {
    fn from(hint: FloorHint) -> Self {
        Self {
            building: hint.building,
            floor: hint.floor,
        }
    }
}

/// Point-in-polygon building and floor resolution.
#[async_trait]
pub trait SpatialResolver: Send + Sync {
    /// Resolve a point. `Ok(None)` means the point lies outside every known building.
    async fn resolve(
        &self,
        point: Point,
        hint: Option<&FloorHint>,
    ) -> AtriumResult<Option<ResolvedPlacement>>;
}

/// Per-user routing preferences store.
#[async_trait]
pub trait PreferencesStore: Send + Sync {
    /// Stored preferences for a user, if any.
    async fn preferences(&self, user: &UserId) -> AtriumResult<Option<UserPreferences>>;
}

/// Turns a bearer credential into a user identity.
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    /// Verify a token, returning the user it was issued to.
    async fn verify(&self, token: &str) -> AtriumResult<UserId>;
}

/// Receives a user's location history when tracking stops.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// Archive an ordered (oldest first) history.
    async fn archive(&self, user: &UserId, history: Vec<UserLocation>) -> AtriumResult<()>;
}

/// Analytics events emitted by the core. Persistence is external.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AnalyticsEvent {
    /// A route was computed for a user
    RouteRequest {
        /// Requesting user
        user: UserId,
        /// Computed route
        route_id: RouteId,
        /// Route length in meters
        distance: f64,
        /// Route time in seconds
        estimated_time: u64,
        /// Whether the route is step-free
        accessible: bool,
    },
    /// A location update was accepted
    LocationUpdate {
        /// Tracked user
        user: UserId,
        /// Accepted fix
        location: UserLocation,
    },
    /// Periodic per-session location sample
    LocationAnalytics {
        /// Tracked user
        user: UserId,
        /// Building of the current fix
        building: BuildingId,
        /// Floor of the current fix
        floor: i32,
        /// Source of the current fix
        source: LocationSource,
        /// Accuracy of the current fix
        accuracy: f64,
        /// Timestamp of the current fix
        timestamp: DateTime<Utc>,
    },
}

impl AnalyticsEvent {
    /// Name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RouteRequest { .. } => "route_request",
            Self::LocationUpdate { .. } => "location_update",
            Self::LocationAnalytics { .. } => "location_analytics",
        }
    }
}

/// Receives analytics events.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    /// Record one event.
    async fn record(&self, event: AnalyticsEvent) -> AtriumResult<()>;
}

//! Atrium Core - Shared Vocabulary
//!
//! This crate holds everything the positioning, routing, tracking and gateway
//! layers agree on:
//!
//! - Identifiers: `NodeId`, `EdgeId`, `BeaconId`, `BuildingId`, `UserId`, ...
//! - Data model: navigation nodes and edges, beacons and observations, user
//!   locations, routes and instructions, user preferences
//! - Unified error type: `AtriumError` with stable `ErrorCode`s
//! - Effects: the `Clock` time effect and the collaborator traits the core
//!   consumes (spatial resolution, preferences, authentication, archival,
//!   analytics) together with simple in-process adapters
//!
//! # Architecture
//!
//! This is the leaf crate of the workspace. It has no knowledge of graph
//! search, estimation or transport; those live in `atrium-routing`,
//! `atrium-positioning`, `atrium-tracking` and `atrium-gateway`.
//!
//! # Example
//!
//! ```
//! use atrium_core::{Point, UserPreferences, WalkingSpeed};
//!
//! let prefs = UserPreferences {
//!     accessible_only: true,
//!     preferred_walking_speed: WalkingSpeed::Slow,
//!     ..UserPreferences::default()
//! };
//! assert_eq!(prefs.walking_speed_mps(), 1.0);
//! assert_eq!(Point::new(0.0, 0.0).distance_to(&Point::new(3.0, 4.0)), 5.0);
//! ```

pub mod effects;
pub mod error;
pub mod geometry;
pub mod ids;
pub mod time;
pub mod types;

pub use effects::{
    AnalyticsEvent, AnalyticsSink, ArchiveSink, AuthVerifier, BuildingFootprint,
    BuildingFootprints, FloorHint, HmacTokenVerifier, InMemoryPreferences, PreferencesStore,
    ResolvedPlacement, SpatialResolver, StaticTokenVerifier, TracingAnalyticsSink,
    TracingArchiveSink,
};
pub use error::{AtriumError, AtriumResult, ErrorCode};
pub use geometry::{Point, Polygon};
pub use ids::{BeaconId, BuildingId, EdgeId, GeofenceId, NodeId, RouteId, UserId};
pub use time::{Clock, SystemClock};
pub use types::{
    Beacon, BeaconIdentity, BeaconObservation, BeaconStatus, Direction, EdgeKind,
    LocationSource, NavigationEdge, NavigationNode, NodeKind, ProximityZone, Route,
    RouteInstruction, RouteMetadata, UserLocation, UserPreferences, WalkingSpeed,
};

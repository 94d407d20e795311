//! Atrium Tracking - Per-User Sessions
//!
//! A tracking session exists per user between `start_tracking` and
//! `stop_tracking`. While it exists, every accepted fix is smoothed,
//! appended to a bounded history, checked against the configured geofences
//! and checked for a prolonged stay. A timer scoped to the session repeats
//! the stay check and records location analytics.
//!
//! # Example
//!
//! ```no_run
//! # async fn demo(tracker: atrium_tracking::SessionTracker) -> atrium_core::AtriumResult<()> {
//! use atrium_core::{BuildingId, LocationSource, Point, UserId};
//! use atrium_tracking::ManualFix;
//!
//! let user = UserId::new("u1");
//! tracker.start_tracking(&user)?;
//! tracker
//!     .update_manual(
//!         &user,
//!         ManualFix {
//!             point: Point::new(3.0, 4.0),
//!             floor: 1,
//!             building: BuildingId::new("main"),
//!             accuracy: 2.0,
//!             source: LocationSource::Manual,
//!         },
//!     )
//!     .await?;
//! tracker.stop_tracking(&user).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod events;
pub mod geofence;
mod session;
pub mod stay;
pub mod timer;
pub mod tracker;

pub use config::TrackingConfig;
pub use events::{TracingEventSink, TrackingEvent, TrackingEventSink};
pub use geofence::{Crossing, Geofence, GeofenceMembership, GeofenceShape};
pub use stay::{Stay, StayDetector};
pub use timer::SessionTimer;
pub use tracker::{ManualFix, NearbyUser, SessionTracker, TrackerEffects};

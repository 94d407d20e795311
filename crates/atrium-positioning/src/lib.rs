//! Atrium Positioning - Beacon Location Pipeline
//!
//! Turns beacon scans into smoothed user positions:
//!
//! - `BeaconRegistry` / `BeaconRegistryStore`: read-mostly beacon snapshots
//!   with copy-on-write administration and a side table of last-seen times
//! - `TriangulationEngine`: weighted solve over matched observations with
//!   accuracy and confidence estimates
//! - `LocationFilter`: outlier correction and Kalman-style smoothing over a
//!   per-user `FilterWindow`
//!
//! The filter holds no state of its own; each user's window lives with that
//! user's session so it is only ever touched by one owner at a time.

pub mod filter;
pub mod registry;
pub mod triangulation;

pub use filter::{FilterConfig, FilterWindow, LocationFilter};
pub use registry::{BeaconRegistry, BeaconRegistryStore, BeaconStats, NEARBY_BEACONS_LIMIT};
pub use triangulation::{
    MatchedObservation, TriangulationConfig, TriangulationEngine, TriangulationResult,
};

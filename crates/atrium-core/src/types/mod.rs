//! Data model shared by every layer.

mod beacon;
mod graph;
mod location;
mod preferences;
mod route;

pub use beacon::{Beacon, BeaconIdentity, BeaconObservation, BeaconStatus, ProximityZone};
pub use graph::{EdgeKind, NavigationEdge, NavigationNode, NodeKind};
pub use location::{LocationSource, UserLocation};
pub use preferences::{UserPreferences, WalkingSpeed};
pub use route::{Direction, Route, RouteInstruction, RouteMetadata};

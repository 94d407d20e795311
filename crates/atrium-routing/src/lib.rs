//! Atrium Routing - Indoor Wayfinding
//!
//! Waypoint graph storage and A* route computation:
//!
//! - `NavigationGraph`: immutable snapshot of nodes and edges with nearest-node,
//!   nearby-node and filtered neighbor queries
//! - `GraphStore`: atomically swappable snapshot pointer
//! - `PathfindingEngine`: coordinate- and node-based route computation under a
//!   per-user cost policy
//! - `instructions`: turn-by-turn step generation
//!
//! Route computation is synchronous and CPU-bound. It takes a snapshot once
//! per request and never blocks other requests.

pub mod config;
pub mod graph;
pub mod instructions;
pub mod pathfinding;

pub use config::RoutingConfig;
pub use graph::{GraphStore, NavigationGraph, Neighbor, NodeFilter, NEARBY_NODES_LIMIT};
pub use pathfinding::{PathfindingEngine, RouteEndpoint};

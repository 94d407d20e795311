//! Navigation graph entities
//!
//! Nodes and edges are produced by map ingestion and are immutable while a
//! graph snapshot is in use.

use crate::geometry::Point;
use crate::ids::{BuildingId, EdgeId, NodeId};
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Kind of waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Point along a corridor
    Corridor,
    /// Corridor junction
    Intersection,
    /// Doorway into a room
    RoomEntrance,
    /// Stair landing
    Stairs,
    /// Elevator door
    Elevator,
    /// Building entrance
    Entrance,
    /// Building exit
    Exit,
}

/// A traversable waypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationNode {
    /// Node identifier
    pub id: NodeId,
    /// Position in the building-local frame
    pub point: Point,
    /// Floor number
    pub floor: i32,
    /// Owning building
    pub building: BuildingId,
    /// Waypoint kind
    pub kind: NodeKind,
    /// Human-readable label used as a landmark in instructions
    #[serde(default)]
    pub name: Option<String>,
    /// Usable without steps
    #[serde(default = "default_true")]
    pub accessible: bool,
    /// Inactive nodes are never routed through
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Kind of connection between two waypoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Indoor corridor segment
    Corridor,
    /// Staircase
    Stairs,
    /// Elevator ride
    Elevator,
    /// Ramp
    Ramp,
    /// Outdoor walkway
    Outdoor,
}

/// A directed connection between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationEdge {
    /// Edge identifier
    pub id: EdgeId,
    /// Tail node
    pub from: NodeId,
    /// Head node
    pub to: NodeId,
    /// Length in meters, never negative
    pub distance: f64,
    /// Nominal traversal time in seconds, never negative
    pub estimated_time: f64,
    /// Connection kind
    pub kind: EdgeKind,
    /// Usable without steps
    #[serde(default = "default_true")]
    pub accessible: bool,
    /// Inactive edges are never routed through
    #[serde(default = "default_true")]
    pub active: bool,
    /// Traversable in both directions
    #[serde(default = "default_true")]
    pub bidirectional: bool,
}

impl NavigationEdge {
    /// The same connection traversed head to tail.
    pub fn reversed(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
            ..self.clone()
        }
    }
}

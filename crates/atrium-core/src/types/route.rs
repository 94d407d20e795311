//! Computed routes and turn-by-turn instructions

use crate::ids::{BuildingId, RouteId};
use crate::types::graph::{NavigationEdge, NavigationNode};
use serde::{Deserialize, Serialize};

/// Heading for an instruction step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Bearing around 0°
    North,
    /// Bearing around 45°
    Northeast,
    /// Bearing around 90°
    East,
    /// Bearing around 135°
    Southeast,
    /// Bearing around 180°
    South,
    /// Bearing around 225°
    Southwest,
    /// Bearing around 270°
    West,
    /// Bearing around 315°
    Northwest,
    /// Moving to a higher floor
    Up,
    /// Moving to a lower floor
    Down,
    /// No horizontal displacement
    Straight,
}

impl Direction {
    /// Compass direction for a bearing in degrees (0 = north, clockwise).
    pub fn from_bearing(bearing_deg: f64) -> Self {
        const SECTORS: [Direction; 8] = [
            Direction::North,
            Direction::Northeast,
            Direction::East,
            Direction::Southeast,
            Direction::South,
            Direction::Southwest,
            Direction::West,
            Direction::Northwest,
        ];
        let normalized = bearing_deg.rem_euclid(360.0);
        let index = ((normalized + 22.5) / 45.0).floor() as usize % 8;
        SECTORS[index]
    }
}

/// One step of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteInstruction {
    /// 1-based step number
    pub step: usize,
    /// Human-readable text
    pub instruction: String,
    /// Length of the step in meters
    pub distance: f64,
    /// Heading for the step
    pub direction: Direction,
    /// Name of the step's target node, when it has one
    pub landmark: Option<String>,
    /// Target floor, present only when the step changes floor
    pub floor: Option<i32>,
    /// Target node of the step
    pub node: NavigationNode,
}

/// Search statistics and route summary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteMetadata {
    /// Nodes popped from the open set
    pub nodes_expanded: usize,
    /// Floors visited in path order, without repeats
    pub floors: Vec<i32>,
    /// Buildings visited in path order, without repeats
    pub buildings: Vec<BuildingId>,
    /// Whether any step changes floor
    pub changes_floor: bool,
}

/// An immutable computed route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Route identifier
    pub id: RouteId,
    /// Start node
    pub from: NavigationNode,
    /// Goal node
    pub to: NavigationNode,
    /// Nodes in travel order, start and goal included
    pub path: Vec<NavigationNode>,
    /// Edges in travel order, `path.len() - 1` of them
    pub edges: Vec<NavigationEdge>,
    /// Sum of edge distances in meters
    pub total_distance: f64,
    /// Estimated travel time in whole seconds
    pub estimated_time: u64,
    /// True iff every edge on the path is accessible
    pub accessible: bool,
    /// Turn-by-turn steps, one per edge
    pub instructions: Vec<RouteInstruction>,
    /// Search statistics
    pub metadata: RouteMetadata,
}

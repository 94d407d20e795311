//! A* pathfinding over the navigation graph
//!
//! Edge cost is the edge distance in meters. The heuristic is the Euclidean
//! distance between node coordinates with no floor term, scaled by the graph
//! so it never exceeds any edge's cost; it is therefore admissible and the
//! first time the goal is popped its cost is minimal.
//!
//! Ties on `f` go to the entry with the lower `h` (closer to the goal), then
//! to the entry pushed first. Predecessors only change on a strict `g`
//! improvement, so the result is deterministic for a given snapshot.

use crate::config::RoutingConfig;
use crate::graph::{GraphStore, NavigationGraph, NodeFilter};
use crate::instructions;
use atrium_core::{
    AtriumError, AtriumResult, BuildingId, EdgeKind, NavigationEdge, NavigationNode, NodeId,
    Point, Route, RouteId, RouteMetadata, UserPreferences,
};
use petgraph::graph::{EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

/// A coordinate-based route endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEndpoint {
    /// Requested position
    pub point: Point,
    /// Restrict the nearest-node lookup to a floor
    #[serde(default)]
    pub floor: Option<i32>,
    /// Restrict the nearest-node lookup to a building
    #[serde(default)]
    pub building: Option<BuildingId>,
}

impl RouteEndpoint {
    /// Endpoint at a point with no floor or building restriction.
    pub fn at(point: Point) -> Self {
        Self {
            point,
            floor: None,
            building: None,
        }
    }

    /// Restrict to a floor of a building.
    pub fn on(mut self, building: BuildingId, floor: i32) -> Self {
        self.building = Some(building);
        self.floor = Some(floor);
        self
    }

    fn filter(&self) -> NodeFilter {
        NodeFilter {
            floor: self.floor,
            building: self.building.clone(),
        }
    }
}

/// Open-set entry
#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    index: NodeIndex,
    g: f64,
    h: f64,
    seq: u64,
}

impl OpenEntry {
    fn f(&self) -> f64 {
        self.g + self.h
    }
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behavior on (f, h, seq)
        other
            .f()
            .total_cmp(&self.f())
            .then_with(|| other.h.total_cmp(&self.h))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Why a search ended without a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchFailure {
    /// Every reachable node was expanded
    Exhausted,
    /// The configured expansion budget ran out first
    ExpansionLimit(usize),
}

/// Raw search result
struct SearchOutcome {
    nodes: Vec<NodeIndex>,
    edges: Vec<EdgeIndex>,
    nodes_expanded: usize,
}

/// Route computation over the current graph snapshot.
#[derive(Debug, Clone)]
pub struct PathfindingEngine {
    graphs: Arc<GraphStore>,
    config: RoutingConfig,
}

impl PathfindingEngine {
    /// Create an engine reading snapshots from `graphs`.
    pub fn new(graphs: Arc<GraphStore>, config: RoutingConfig) -> Self {
        Self { graphs, config }
    }

    /// Active configuration.
    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Snapshot store backing this engine.
    pub fn graphs(&self) -> &Arc<GraphStore> {
        &self.graphs
    }

    /// Compute a route between two coordinates, snapping each to its nearest node.
    pub fn compute_route(
        &self,
        from: &RouteEndpoint,
        to: &RouteEndpoint,
        preferences: &UserPreferences,
    ) -> AtriumResult<Route> {
        let graph = self.graphs.snapshot();
        let radius = self.config.max_search_radius_m;
        let start = graph.nearest_node(from.point, &from.filter(), radius)?.id.clone();
        let goal = graph.nearest_node(to.point, &to.filter(), radius)?.id.clone();
        self.route_on(&graph, &start, &goal, preferences)
    }

    /// Compute a route between two known nodes.
    pub fn compute_route_between_nodes(
        &self,
        from: &NodeId,
        to: &NodeId,
        preferences: &UserPreferences,
    ) -> AtriumResult<Route> {
        let graph = self.graphs.snapshot();
        self.route_on(&graph, from, to, preferences)
    }

    fn route_on(
        &self,
        graph: &NavigationGraph,
        from: &NodeId,
        to: &NodeId,
        preferences: &UserPreferences,
    ) -> AtriumResult<Route> {
        let start = active_index(graph, from)?;
        let goal = active_index(graph, to)?;

        let outcome = self
            .search(graph, start, goal, preferences)
            .map_err(|failure| match failure {
                SearchFailure::Exhausted => AtriumError::no_route(from.clone(), to.clone()),
                SearchFailure::ExpansionLimit(expanded) => AtriumError::configuration(format!(
                    "route search from {from} to {to} stopped after {expanded} node expansions \
                     (routing.max_expansions)"
                )),
            })?;

        let route = self.assemble(graph, outcome, preferences);
        tracing::debug!(
            route_id = %route.id,
            from = %from,
            to = %to,
            distance = route.total_distance,
            nodes_expanded = route.metadata.nodes_expanded,
            "Route computed"
        );
        Ok(route)
    }

    fn search(
        &self,
        graph: &NavigationGraph,
        start: NodeIndex,
        goal: NodeIndex,
        preferences: &UserPreferences,
    ) -> Result<SearchOutcome, SearchFailure> {
        let mut open_set = BinaryHeap::new();
        let mut closed_set = HashSet::new();
        let mut came_from: HashMap<NodeIndex, (NodeIndex, EdgeIndex)> = HashMap::new();
        let mut g_scores: HashMap<NodeIndex, f64> = HashMap::new();
        let mut seq = 0u64;

        open_set.push(OpenEntry {
            index: start,
            g: 0.0,
            h: graph.heuristic(start, goal),
            seq,
        });
        g_scores.insert(start, 0.0);

        let mut nodes_expanded = 0usize;

        while let Some(current) = open_set.pop() {
            if !closed_set.insert(current.index) {
                continue;
            }
            nodes_expanded += 1;

            if current.index == goal {
                return Ok(reconstruct(&came_from, goal, nodes_expanded));
            }

            if nodes_expanded >= self.config.max_expansions {
                tracing::warn!(nodes_expanded, "Route search hit the expansion limit");
                return Err(SearchFailure::ExpansionLimit(nodes_expanded));
            }

            for neighbor in graph.neighbors_of(current.index, preferences) {
                if closed_set.contains(&neighbor.target) {
                    continue;
                }
                let tentative_g = current.g + neighbor.edge.distance;
                let known_g = g_scores
                    .get(&neighbor.target)
                    .copied()
                    .unwrap_or(f64::INFINITY);
                if tentative_g < known_g {
                    came_from.insert(neighbor.target, (current.index, neighbor.edge_index));
                    g_scores.insert(neighbor.target, tentative_g);
                    seq += 1;
                    open_set.push(OpenEntry {
                        index: neighbor.target,
                        g: tentative_g,
                        h: graph.heuristic(neighbor.target, goal),
                        seq,
                    });
                }
            }
        }

        tracing::debug!(nodes_expanded, "Open set exhausted without reaching goal");
        Err(SearchFailure::Exhausted)
    }

    fn assemble(
        &self,
        graph: &NavigationGraph,
        outcome: SearchOutcome,
        preferences: &UserPreferences,
    ) -> Route {
        let path: Vec<NavigationNode> = outcome
            .nodes
            .iter()
            .map(|&ix| graph.node_at(ix).clone())
            .collect();
        let edges: Vec<NavigationEdge> = outcome
            .edges
            .iter()
            .map(|&ix| graph.edge_at(ix).clone())
            .collect();

        let total_distance: f64 = edges.iter().map(|e| e.distance).sum();
        let elevator_waits = edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Elevator)
            .count() as f64
            * self.config.elevator_wait_secs;
        let seconds = total_distance / preferences.walking_speed_mps() + elevator_waits;
        let accessible = edges.iter().all(|e| e.accessible);

        let mut metadata = RouteMetadata {
            nodes_expanded: outcome.nodes_expanded,
            ..RouteMetadata::default()
        };
        for node in &path {
            if !metadata.floors.contains(&node.floor) {
                metadata.floors.push(node.floor);
            }
            if !metadata.buildings.contains(&node.building) {
                metadata.buildings.push(node.building.clone());
            }
        }
        metadata.changes_floor = path.windows(2).any(|w| w[0].floor != w[1].floor);

        let instructions = instructions::generate(&path, &edges);
        // Path is never empty: it holds at least the start node
        let from = path[0].clone();
        let to = path[path.len() - 1].clone();

        Route {
            id: RouteId::generate(),
            from,
            to,
            path,
            edges,
            total_distance,
            estimated_time: seconds.round() as u64,
            accessible,
            instructions,
            metadata,
        }
    }
}

fn active_index(graph: &NavigationGraph, id: &NodeId) -> AtriumResult<NodeIndex> {
    match graph.index_of(id) {
        Some(ix) if graph.node_at(ix).active => Ok(ix),
        Some(_) => Err(AtriumError::invalid_input(format!("node {id} is inactive"))),
        None => Err(AtriumError::invalid_input(format!("unknown node {id}"))),
    }
}

fn reconstruct(
    came_from: &HashMap<NodeIndex, (NodeIndex, EdgeIndex)>,
    goal: NodeIndex,
    nodes_expanded: usize,
) -> SearchOutcome {
    let mut nodes = vec![goal];
    let mut edges = Vec::new();
    let mut current = goal;
    while let Some(&(prev, edge)) = came_from.get(&current) {
        edges.push(edge);
        nodes.push(prev);
        current = prev;
    }
    nodes.reverse();
    edges.reverse();
    SearchOutcome {
        nodes,
        edges,
        nodes_expanded,
    }
}

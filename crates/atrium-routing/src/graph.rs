//! Navigation graph
//!
//! An immutable snapshot of waypoints and connections built once from map
//! data. All lookups are read-only, so a snapshot can be shared by any number
//! of concurrent route computations. Administrative changes build a new
//! snapshot and swap it into the [`GraphStore`].

use atrium_core::{
    AtriumError, AtriumResult, BuildingId, EdgeKind, NavigationEdge, NavigationNode, NodeId,
    Point, UserPreferences,
};
use parking_lot::RwLock;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum number of results returned by [`NavigationGraph::nodes_within`].
pub const NEARBY_NODES_LIMIT: usize = 10;

/// A traversable neighbor returned by [`NavigationGraph::neighbors`].
#[derive(Debug, Clone, Copy)]
pub struct Neighbor<'a> {
    /// Neighbor node
    pub node: &'a NavigationNode,
    /// Edge leading to it
    pub edge: &'a NavigationEdge,
    pub(crate) target: NodeIndex,
    pub(crate) edge_index: EdgeIndex,
}

/// Filter on nearest-node queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeFilter {
    /// Restrict to one floor
    pub floor: Option<i32>,
    /// Restrict to one building
    pub building: Option<BuildingId>,
}

impl NodeFilter {
    fn matches(&self, node: &NavigationNode) -> bool {
        node.active
            && self.floor.map_or(true, |f| f == node.floor)
            && self.building.as_ref().map_or(true, |b| b == &node.building)
    }
}

/// Waypoint graph with id lookup.
#[derive(Debug, Clone, Default)]
pub struct NavigationGraph {
    graph: DiGraph<NavigationNode, NavigationEdge>,
    index: HashMap<NodeId, NodeIndex>,
    heuristic_scale: f64,
}

impl NavigationGraph {
    /// Build a graph from map data.
    ///
    /// Node ids must be unique and edges must reference known nodes with
    /// non-negative distance and time. Inactive edges, and edges touching an
    /// inactive node, are left out of the snapshot. Bidirectional edges are
    /// stored once per direction.
    pub fn build(nodes: Vec<NavigationNode>, edges: Vec<NavigationEdge>) -> AtriumResult<Self> {
        let mut graph = DiGraph::with_capacity(nodes.len(), edges.len() * 2);
        let mut index = HashMap::with_capacity(nodes.len());

        for node in nodes {
            let id = node.id.clone();
            if index.contains_key(&id) {
                return Err(AtriumError::configuration(format!(
                    "duplicate navigation node {id}"
                )));
            }
            let ix = graph.add_node(node);
            index.insert(id, ix);
        }

        let mut skipped = 0usize;
        let mut heuristic_scale: f64 = 1.0;
        for edge in edges {
            if !(edge.distance.is_finite() && edge.distance >= 0.0)
                || !(edge.estimated_time.is_finite() && edge.estimated_time >= 0.0)
            {
                return Err(AtriumError::configuration(format!(
                    "edge {} has a negative or non-finite cost",
                    edge.id
                )));
            }
            let (Some(&from), Some(&to)) = (index.get(&edge.from), index.get(&edge.to)) else {
                return Err(AtriumError::configuration(format!(
                    "edge {} references an unknown node",
                    edge.id
                )));
            };
            if !edge.active || !graph[from].active || !graph[to].active {
                skipped += 1;
                continue;
            }

            // Keep the Euclidean estimate below every edge's actual cost
            let span = graph[from].point.distance_to(&graph[to].point);
            if span > 0.0 {
                heuristic_scale = heuristic_scale.min(edge.distance / span);
            }

            if edge.bidirectional {
                graph.add_edge(to, from, edge.reversed());
            }
            graph.add_edge(from, to, edge);
        }

        if skipped > 0 {
            tracing::debug!(skipped, "Skipped inactive navigation edges");
        }
        if heuristic_scale < 1.0 {
            tracing::warn!(
                heuristic_scale,
                "Edges shorter than their straight-line span; heuristic scaled down"
            );
        }

        Ok(Self {
            graph,
            index,
            heuristic_scale,
        })
    }

    /// Number of nodes, active or not.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of directed connections.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Look up a node by id.
    pub fn node(&self, id: &NodeId) -> Option<&NavigationNode> {
        self.index.get(id).map(|&ix| &self.graph[ix])
    }

    pub(crate) fn index_of(&self, id: &NodeId) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub(crate) fn node_at(&self, ix: NodeIndex) -> &NavigationNode {
        &self.graph[ix]
    }

    pub(crate) fn edge_at(&self, ix: EdgeIndex) -> &NavigationEdge {
        &self.graph[ix]
    }

    /// Admissible estimate of the remaining cost between two nodes.
    pub(crate) fn heuristic(&self, from: NodeIndex, to: NodeIndex) -> f64 {
        self.graph[from].point.distance_to(&self.graph[to].point) * self.heuristic_scale
    }

    /// Active node closest to `point` within `max_radius_m`.
    ///
    /// Ties go to the node inserted first.
    pub fn nearest_node(
        &self,
        point: Point,
        filter: &NodeFilter,
        max_radius_m: f64,
    ) -> AtriumResult<&NavigationNode> {
        let mut best: Option<(f64, NodeIndex)> = None;
        for ix in self.graph.node_indices() {
            let node = &self.graph[ix];
            if !filter.matches(node) {
                continue;
            }
            let d = node.point.distance_to(&point);
            if d > max_radius_m {
                continue;
            }
            // Strict comparison keeps the earliest index on ties
            if best.map_or(true, |(bd, _)| d < bd) {
                best = Some((d, ix));
            }
        }
        best.map(|(_, ix)| &self.graph[ix])
            .ok_or_else(|| AtriumError::no_node_nearby(point.x, point.y, max_radius_m))
    }

    /// Active nodes within `radius_m` of `point`, nearest first, at most
    /// [`NEARBY_NODES_LIMIT`] of them.
    pub fn nodes_within(
        &self,
        point: Point,
        radius_m: f64,
        filter: &NodeFilter,
    ) -> Vec<(&NavigationNode, f64)> {
        let mut found: Vec<(&NavigationNode, f64)> = self
            .graph
            .node_weights()
            .filter(|n| filter.matches(n))
            .map(|n| (n, n.point.distance_to(&point)))
            .filter(|(_, d)| *d <= radius_m)
            .collect();
        found.sort_by(|a, b| a.1.total_cmp(&b.1));
        found.truncate(NEARBY_NODES_LIMIT);
        found
    }

    /// Traversable neighbors of a node under a cost policy.
    ///
    /// Hard filters are applied here so the search never sees an edge it may
    /// not use: `accessible_only` drops non-accessible edges and targets,
    /// `avoid_stairs` drops stair edges. `prefer_elevator` only moves
    /// elevator edges to the front.
    pub fn neighbors(
        &self,
        id: &NodeId,
        preferences: &UserPreferences,
    ) -> AtriumResult<Vec<Neighbor<'_>>> {
        let ix = self
            .index_of(id)
            .ok_or_else(|| AtriumError::invalid_input(format!("unknown node {id}")))?;
        Ok(self.neighbors_of(ix, preferences))
    }

    pub(crate) fn neighbors_of(
        &self,
        ix: NodeIndex,
        preferences: &UserPreferences,
    ) -> Vec<Neighbor<'_>> {
        let mut out: Vec<Neighbor<'_>> = self
            .graph
            .edges(ix)
            .filter_map(|e| {
                let edge = e.weight();
                let node = &self.graph[e.target()];
                if !node.active {
                    return None;
                }
                if preferences.accessible_only && !(edge.accessible && node.accessible) {
                    return None;
                }
                if preferences.avoid_stairs && edge.kind == EdgeKind::Stairs {
                    return None;
                }
                Some(Neighbor {
                    node,
                    edge,
                    target: e.target(),
                    edge_index: e.id(),
                })
            })
            .collect();

        // petgraph yields outgoing edges newest first; restore map order
        out.sort_by_key(|n| n.edge_index);
        if preferences.prefer_elevator {
            out.sort_by_key(|n| n.edge.kind != EdgeKind::Elevator);
        }
        out
    }
}

/// Holder of the current graph snapshot.
///
/// Readers clone the `Arc` and release the lock immediately; a replacement
/// never disturbs searches already running on the previous snapshot.
#[derive(Debug, Default)]
pub struct GraphStore {
    current: RwLock<Arc<NavigationGraph>>,
}

impl GraphStore {
    /// Create a store holding `graph`.
    pub fn new(graph: NavigationGraph) -> Self {
        Self {
            current: RwLock::new(Arc::new(graph)),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<NavigationGraph> {
        Arc::clone(&self.current.read())
    }

    /// Atomically replace the snapshot.
    pub fn replace(&self, graph: NavigationGraph) {
        let nodes = graph.node_count();
        let edges = graph.edge_count();
        *self.current.write() = Arc::new(graph);
        tracing::info!(nodes, edges, "Navigation graph snapshot replaced");
    }
}

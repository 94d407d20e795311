//! Map builders

use atrium_core::{
    Beacon, BeaconId, BeaconIdentity, BeaconStatus, BuildingId, EdgeId, EdgeKind,
    NavigationEdge, NavigationNode, NodeId, NodeKind, Point,
};

/// Builds nodes, edges and beacons for one building.
///
/// Every node starts as an accessible, active corridor node; every edge as
/// an accessible, active, bidirectional connection.
#[derive(Debug, Clone)]
pub struct MapBuilder {
    building: BuildingId,
    nodes: Vec<NavigationNode>,
    edges: Vec<NavigationEdge>,
    beacons: Vec<Beacon>,
}

impl MapBuilder {
    /// Start a map for a building.
    pub fn new(building: &str) -> Self {
        Self {
            building: BuildingId::new(building),
            nodes: Vec::new(),
            edges: Vec::new(),
            beacons: Vec::new(),
        }
    }

    /// Add a corridor node.
    pub fn node(self, id: &str, x: f64, y: f64, floor: i32) -> Self {
        self.node_of(id, x, y, floor, NodeKind::Corridor)
    }

    /// Add a node of a given kind.
    pub fn node_of(mut self, id: &str, x: f64, y: f64, floor: i32, kind: NodeKind) -> Self {
        self.nodes.push(NavigationNode {
            id: NodeId::new(id),
            point: Point::new(x, y),
            floor,
            building: self.building.clone(),
            kind,
            name: None,
            accessible: true,
            active: true,
        });
        self
    }

    /// Name the most recently added node.
    pub fn named(mut self, name: &str) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.name = Some(name.to_string());
        }
        self
    }

    /// Add an accessible corridor edge.
    pub fn corridor(self, from: &str, to: &str, distance: f64) -> Self {
        self.edge(from, to, distance, EdgeKind::Corridor)
    }

    /// Add an edge of a given kind.
    pub fn edge(mut self, from: &str, to: &str, distance: f64, kind: EdgeKind) -> Self {
        let id = format!("{from}-{to}-{}", self.edges.len());
        self.edges.push(NavigationEdge {
            id: EdgeId::new(id),
            from: NodeId::new(from),
            to: NodeId::new(to),
            distance,
            estimated_time: distance / 1.4,
            kind,
            accessible: kind != EdgeKind::Stairs,
            active: true,
            bidirectional: true,
        });
        self
    }

    /// Mark the most recently added edge as not accessible.
    pub fn inaccessible(mut self) -> Self {
        if let Some(edge) = self.edges.last_mut() {
            edge.accessible = false;
        }
        self
    }

    /// Make the most recently added edge one-way.
    pub fn one_way(mut self) -> Self {
        if let Some(edge) = self.edges.last_mut() {
            edge.bidirectional = false;
        }
        self
    }

    /// Add an active beacon. Its identity is `(building, 1, minor)`.
    pub fn beacon(mut self, id: &str, minor: u16, x: f64, y: f64, floor: i32) -> Self {
        self.beacons.push(Beacon {
            id: BeaconId::new(id),
            identity: BeaconIdentity::new(self.building.as_str(), 1, minor),
            name: id.to_string(),
            point: Point::new(x, y),
            floor,
            building: self.building.clone(),
            tx_power: -59.0,
            nominal_accuracy: 2.0,
            status: BeaconStatus::Active,
            last_seen_at: None,
        });
        self
    }

    /// Set the status of the most recently added beacon.
    pub fn status(mut self, status: BeaconStatus) -> Self {
        if let Some(beacon) = self.beacons.last_mut() {
            beacon.status = status;
        }
        self
    }

    /// Nodes added so far.
    pub fn nodes(&self) -> &[NavigationNode] {
        &self.nodes
    }

    /// Edges added so far.
    pub fn edges(&self) -> &[NavigationEdge] {
        &self.edges
    }

    /// Beacons added so far.
    pub fn beacons(&self) -> &[Beacon] {
        &self.beacons
    }

    /// Take the nodes and edges.
    pub fn into_graph_parts(self) -> (Vec<NavigationNode>, Vec<NavigationEdge>) {
        (self.nodes, self.edges)
    }

    /// Take the beacons.
    pub fn into_beacons(self) -> Vec<Beacon> {
        self.beacons
    }
}

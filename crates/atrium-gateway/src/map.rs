//! Map bundle loading
//!
//! A map bundle is the JSON document produced by map ingestion: waypoints,
//! edges, beacons and building footprints. It is read once at startup and
//! turned into the immutable graph and registry snapshots.

use atrium_core::{
    AtriumError, AtriumResult, Beacon, BuildingFootprint, BuildingFootprints, NavigationEdge,
    NavigationNode,
};
use atrium_positioning::BeaconRegistry;
use atrium_routing::NavigationGraph;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything ingested for one deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapBundle {
    /// Navigation waypoints
    #[serde(default)]
    pub nodes: Vec<NavigationNode>,
    /// Navigation edges
    #[serde(default)]
    pub edges: Vec<NavigationEdge>,
    /// Registered beacons
    #[serde(default)]
    pub beacons: Vec<Beacon>,
    /// Building outlines
    #[serde(default)]
    pub footprints: Vec<BuildingFootprint>,
}

/// Snapshots built from a bundle.
#[derive(Debug)]
pub struct LoadedMap {
    /// Routable graph
    pub graph: NavigationGraph,
    /// Beacon registry
    pub registry: BeaconRegistry,
    /// Building resolver
    pub footprints: BuildingFootprints,
}

impl MapBundle {
    /// Parse a bundle from JSON.
    pub fn from_json(raw: &str) -> AtriumResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| AtriumError::configuration(format!("invalid map bundle: {e}")))
    }

    /// Read a bundle file.
    pub fn load(path: &Path) -> AtriumResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AtriumError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Build the graph, registry and resolver.
    pub fn build(self) -> AtriumResult<LoadedMap> {
        let graph = NavigationGraph::build(self.nodes, self.edges)?;
        let registry = BeaconRegistry::build(self.beacons)?;
        tracing::info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            beacons = registry.len(),
            buildings = self.footprints.len(),
            "Map bundle loaded"
        );
        Ok(LoadedMap {
            graph,
            registry,
            footprints: BuildingFootprints::new(self.footprints),
        })
    }
}

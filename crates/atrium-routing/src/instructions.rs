//! Turn-by-turn instruction generation

use atrium_core::{Direction, EdgeKind, NavigationEdge, NavigationNode, NodeKind, RouteInstruction};

/// Displacement below which two nodes count as stacked.
const STACKED_EPSILON_M: f64 = 1e-6;

/// One instruction per edge of a path.
///
/// `path` holds `edges.len() + 1` nodes in travel order.
pub fn generate(path: &[NavigationNode], edges: &[NavigationEdge]) -> Vec<RouteInstruction> {
    let last = edges.len();
    path.windows(2)
        .zip(edges)
        .enumerate()
        .map(|(i, (pair, edge))| {
            let (from, to) = (&pair[0], &pair[1]);
            RouteInstruction {
                step: i + 1,
                instruction: text(from, to, edge, i + 1 == last),
                distance: edge.distance,
                direction: direction(from, to),
                landmark: to.name.clone(),
                floor: (from.floor != to.floor).then_some(to.floor),
                node: to.clone(),
            }
        })
        .collect()
}

fn text(from: &NavigationNode, to: &NavigationNode, edge: &NavigationEdge, is_last: bool) -> String {
    let name = to.name.as_deref();
    match edge.kind {
        EdgeKind::Stairs if to.floor > from.floor => {
            format!("Take stairs up to floor {}", to.floor)
        }
        EdgeKind::Stairs => format!("Take stairs down to floor {}", to.floor),
        EdgeKind::Elevator if to.floor != from.floor => {
            format!("Take elevator to floor {}", to.floor)
        }
        EdgeKind::Elevator => "Continue through elevator area".to_string(),
        _ if is_last || to.kind == NodeKind::RoomEntrance => {
            format!("Arrive at {}", name.unwrap_or("destination"))
        }
        _ if to.kind == NodeKind::Intersection => {
            format!("Continue straight to {}", name.unwrap_or("intersection"))
        }
        _ => format!("Continue {}m along corridor", edge.distance.round()),
    }
}

/// Compass direction from the bearing; vertical only for stacked nodes.
fn direction(from: &NavigationNode, to: &NavigationNode) -> Direction {
    if from.point.distance_to(&to.point) > STACKED_EPSILON_M {
        return Direction::from_bearing(from.point.bearing_to(&to.point));
    }
    match to.floor.cmp(&from.floor) {
        std::cmp::Ordering::Greater => Direction::Up,
        std::cmp::Ordering::Less => Direction::Down,
        std::cmp::Ordering::Equal => Direction::Straight,
    }
}

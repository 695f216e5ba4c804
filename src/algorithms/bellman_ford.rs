use petgraph::stable_graph::NodeIndex;

use super::{neighbors, ShortestPaths};
use crate::network::TopoGraph;
use crate::{Error, Result};

/// Bellman-Ford from `source`, treating every undirected edge as two arcs.
///
/// Zero and negative weights are allowed. Since edges are undirected, any
/// negative edge reachable from `source` forms a negative cycle with its
/// own reverse arc and the run fails with [`Error::NegativeCycle`].
pub fn shortest_paths(graph: &TopoGraph, source: NodeIndex) -> Result<ShortestPaths> {
    let mut result = ShortestPaths::default();
    result.distances.insert(source, 0.0);

    let vertices: Vec<NodeIndex> = graph.node_indices().collect();

    for _ in 1..vertices.len().max(1) {
        if !relax(graph, &vertices, &mut result) {
            return Ok(result);
        }
    }

    if relax(graph, &vertices, &mut result) {
        return Err(Error::NegativeCycle);
    }

    Ok(result)
}

/// One pass over every arc. Returns whether any distance improved.
fn relax(graph: &TopoGraph, vertices: &[NodeIndex], result: &mut ShortestPaths) -> bool {
    let mut changed = false;

    for &vertex in vertices {
        let cost = match result.distances.get(&vertex) {
            Some(&cost) => cost,
            None => continue,
        };

        for (neighbor, weight) in neighbors(graph, vertex) {
            let new_cost = cost + weight;
            let improves = result
                .distances
                .get(&neighbor)
                .map_or(true, |&known| new_cost < known);

            if improves {
                result.distances.insert(neighbor, new_cost);
                result.previous.insert(neighbor, vertex);
                changed = true;
            }
        }
    }

    changed
}

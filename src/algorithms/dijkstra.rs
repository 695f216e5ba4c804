use std::cmp::Ordering;
use std::collections::BinaryHeap;
use petgraph::stable_graph::NodeIndex;

use super::{neighbors, non_positive, ShortestPaths};
use crate::network::TopoGraph;
use crate::Result;

#[derive(Debug)]
struct State {
    cost: f64,
    vertex: NodeIndex,
}

impl Eq for State {}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.vertex.cmp(&self.vertex))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub fn check_weights(graph: &TopoGraph) -> Result<()> {
    match non_positive(graph) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

// weights must already be checked with check_weights
pub fn shortest_paths(graph: &TopoGraph, source: NodeIndex) -> ShortestPaths {
    let mut result = ShortestPaths::default();
    let mut heap = BinaryHeap::new();

    result.distances.insert(source, 0.0);
    heap.push(State { cost: 0.0, vertex: source });

    while let Some(State { cost, vertex }) = heap.pop() {
        // Skip if we've already found a better path
        if cost > result.distances[&vertex] {
            continue;
        }

        for (neighbor, weight) in neighbors(graph, vertex) {
            let new_cost = cost + weight;
            let improves = result
                .distances
                .get(&neighbor)
                .map_or(true, |&known| new_cost < known);

            if improves {
                result.distances.insert(neighbor, new_cost);
                result.previous.insert(neighbor, vertex);
                heap.push(State { cost: new_cost, vertex: neighbor });
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_cheaper_detour() {
        let mut graph = TopoGraph::default();
        let a = graph.add_node("a".to_string());
        let b = graph.add_node("b".to_string());
        let c = graph.add_node("c".to_string());
        graph.add_edge(a, c, 10.0);
        graph.add_edge(a, b, 1.0);
        graph.add_edge(b, c, 2.0);

        let paths = shortest_paths(&graph, a);
        assert_eq!(paths.distances[&c], 3.0);
        assert_eq!(paths.path_to(a, c).unwrap(), vec![a, b, c]);
    }

    #[test]
    fn unreached_vertex_has_no_path() {
        let mut graph = TopoGraph::default();
        let a = graph.add_node("a".to_string());
        let b = graph.add_node("b".to_string());

        let paths = shortest_paths(&graph, a);
        assert!(paths.path_to(a, b).is_none());
    }
}

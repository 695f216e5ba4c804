pub mod bellman_ford;
pub mod dijkstra;

use std::collections::HashMap;
use std::fmt;
use clap::ValueEnum;
use log::debug;
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use serde::{Deserialize, Serialize};

use crate::network::{TopoGraph, Topology};
use crate::protocol::PathEntry;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    Dijkstra,
    #[value(name = "bellman_ford")]
    BellmanFord,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Dijkstra => write!(f, "dijkstra"),
            Algorithm::BellmanFord => write!(f, "bellman_ford"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShortestPaths {
    pub distances: HashMap<NodeIndex, f64>,
    pub previous: HashMap<NodeIndex, NodeIndex>,
}

impl ShortestPaths {
    pub fn path_to(&self, source: NodeIndex, destination: NodeIndex) -> Option<Vec<NodeIndex>> {
        if !self.distances.contains_key(&destination) {
            return None;
        }

        let mut path = vec![destination];
        let mut current = destination;
        while current != source {
            current = *self.previous.get(&current)?;
            path.push(current);
        }
        path.reverse();
        Some(path)
    }
}

pub(crate) fn neighbors(graph: &TopoGraph, vertex: NodeIndex) -> impl Iterator<Item = (NodeIndex, f64)> + '_ {
    graph.edges(vertex).map(move |edge| {
        let other = if edge.source() == vertex { edge.target() } else { edge.source() };
        (other, *edge.weight())
    })
}

impl Algorithm {
    fn single_source(self, graph: &TopoGraph, source: NodeIndex) -> Result<ShortestPaths> {
        match self {
            Algorithm::Dijkstra => Ok(dijkstra::shortest_paths(graph, source)),
            Algorithm::BellmanFord => bellman_ford::shortest_paths(graph, source),
        }
    }
}

/// Minimum-weight path for every ordered pair of distinct, mutually reachable
/// routers. Unreachable pairs are absent; entries are sorted by source then
/// destination.
pub fn compute_all_pairs(topology: &Topology, algorithm: Algorithm) -> Result<Vec<PathEntry>> {
    let graph = topology.graph();

    if algorithm == Algorithm::Dijkstra {
        dijkstra::check_weights(graph)?;
    }

    let mut entries = Vec::new();
    for source in graph.node_indices() {
        let paths = algorithm.single_source(graph, source)?;
        for destination in graph.node_indices() {
            if destination == source {
                continue;
            }
            if let Some(hops) = paths.path_to(source, destination) {
                entries.push(PathEntry {
                    source: graph[source].clone(),
                    destination: graph[destination].clone(),
                    path: hops.into_iter().map(|ni| graph[ni].clone()).collect(),
                });
            }
        }
    }

    entries.sort_by(|a, b| (&a.source, &a.destination).cmp(&(&b.source, &b.destination)));
    debug!("{} computed {} paths over {} routers", algorithm, entries.len(), graph.node_count());
    Ok(entries)
}

pub fn find_path<'a>(entries: &'a [PathEntry], source: &str, destination: &str) -> Option<&'a [String]> {
    entries
        .iter()
        .find(|e| e.source == source && e.destination == destination)
        .map(|e| e.path.as_slice())
}

pub(crate) fn non_positive(graph: &TopoGraph) -> Option<Error> {
    graph.edge_references().find_map(|edge| {
        let weight = *edge.weight();
        if weight > 0.0 {
            None
        } else {
            Some(Error::NonPositiveWeight {
                from: graph[edge.source()].clone(),
                to: graph[edge.target()].clone(),
                weight,
            })
        }
    })
}

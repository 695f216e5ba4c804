use std::collections::{BTreeMap, HashMap};
use log::{info, warn};
use petgraph::stable_graph::{NodeIndex, StableUnGraph};
use serde::{Deserialize, Serialize};

use crate::{Error, NodeId, Result};

/// Undirected weighted graph whose vertices carry router names.
pub type TopoGraph = StableUnGraph<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum NodeKind {
    Router,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub source: Node,
    pub destination: Node,
    pub weight: f64,
}

impl Link {
    pub fn touches(&self, id: NodeId) -> bool {
        self.source.id == id || self.destination.id == id
    }

    fn joins(&self, a: NodeId, b: NodeId) -> bool {
        (self.source.id == a && self.destination.id == b)
            || (self.source.id == b && self.destination.id == a)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Default)]
pub struct Topology {
    nodes: BTreeMap<NodeId, Node>,
    links: Vec<Link>,
    graph: TopoGraph,
    vertices: HashMap<String, NodeIndex>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    // re-adding a known id is a no-op
    pub fn add_node(&mut self, id: NodeId, name: &str, kind: NodeKind) -> Result<()> {
        if self.nodes.contains_key(&id) {
            return Ok(());
        }
        if self.vertices.contains_key(name) {
            return Err(Error::Registration(format!(
                "name {} is already used by another node",
                name
            )));
        }

        let index = self.graph.add_node(name.to_string());
        self.vertices.insert(name.to_string(), index);
        self.nodes.insert(id, Node { id, name: name.to_string(), kind });
        Ok(())
    }

    // relinking a pair replaces its weight
    pub fn add_link(&mut self, source_id: NodeId, destination_id: NodeId, weight: f64) -> Result<()> {
        let (source, destination) = match (self.nodes.get(&source_id), self.nodes.get(&destination_id)) {
            (Some(s), Some(d)) => (s.clone(), d.clone()),
            _ => {
                return Err(Error::Registration(format!(
                    "one or both nodes of link {}-{} not found in the network",
                    source_id, destination_id
                )));
            }
        };

        let a = self.vertices[&source.name];
        let b = self.vertices[&destination.name];
        self.graph.update_edge(a, b, weight);

        self.links.retain(|link| !link.joins(source_id, destination_id));
        self.links.push(Link { source, destination, weight });
        Ok(())
    }

    pub fn remove_node(&mut self, id: NodeId) -> Result<Node> {
        let node = match self.nodes.remove(&id) {
            Some(node) => node,
            None => {
                warn!("Node ID {} not found in the network", id);
                return Err(Error::Registration(format!("node id {} not found", id)));
            }
        };

        if let Some(index) = self.vertices.remove(&node.name) {
            self.graph.remove_node(index);
        }
        self.links.retain(|link| !link.touches(id));

        info!("Node {} and its associated links have been removed from the network", node.name);
        Ok(node)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn graph(&self) -> &TopoGraph {
        &self.graph
    }

    pub fn snapshot(&self) -> TopologySnapshot {
        TopologySnapshot {
            nodes: self.nodes.values().cloned().collect(),
            links: self.links.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring() -> Topology {
        let mut topology = Topology::new();
        for id in 1..=4 {
            topology.add_node(id, &format!("node{}", id), NodeKind::Router).unwrap();
        }
        for (a, b) in [(1, 2), (2, 3), (3, 4), (4, 1), (2, 4)] {
            topology.add_link(a, b, 1.0).unwrap();
        }
        topology
    }

    fn assert_links_valid(topology: &Topology) {
        for link in topology.links() {
            assert!(topology.contains(link.source.id));
            assert!(topology.contains(link.destination.id));
        }
        assert_eq!(topology.graph().edge_count(), topology.links().len());
        assert_eq!(topology.graph().node_count(), topology.node_count());
    }

    #[test]
    fn add_node_is_idempotent() {
        let mut topology = Topology::new();
        topology.add_node(1, "node1", NodeKind::Router).unwrap();
        topology.add_node(1, "renamed", NodeKind::Router).unwrap();
        assert_eq!(topology.node_count(), 1);
        assert_eq!(topology.snapshot().nodes[0].name, "node1");
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut topology = Topology::new();
        topology.add_node(1, "node1", NodeKind::Router).unwrap();
        assert!(matches!(
            topology.add_node(2, "node1", NodeKind::Router),
            Err(Error::Registration(_))
        ));
    }

    #[test]
    fn link_to_unknown_node_is_skipped() {
        let mut topology = Topology::new();
        topology.add_node(1, "node1", NodeKind::Router).unwrap();
        assert!(topology.add_link(1, 7, 1.0).is_err());
        assert!(topology.links().is_empty());
        assert_eq!(topology.graph().edge_count(), 0);
    }

    #[test]
    fn relinking_replaces_weight() {
        let mut topology = ring();
        topology.add_link(2, 1, 5.0).unwrap();
        assert_eq!(topology.links().len(), 5);
        let link = topology.links().iter().find(|l| l.joins(1, 2)).unwrap();
        assert_eq!(link.weight, 5.0);
        assert_links_valid(&topology);
    }

    #[test]
    fn remove_node_cascades_to_its_links_only() {
        let mut topology = ring();
        let before: Vec<Link> = topology.links().to_vec();

        let removed = topology.remove_node(3).unwrap();
        assert_eq!(removed.name, "node3");

        let expected: Vec<Link> = before.into_iter().filter(|l| !l.touches(3)).collect();
        assert_eq!(topology.links(), expected.as_slice());
        assert_eq!(topology.links().len(), 3);
        assert_links_valid(&topology);
    }

    #[test]
    fn removing_unknown_node_is_a_no_op() {
        let mut topology = ring();
        assert!(topology.remove_node(42).is_err());
        assert_eq!(topology.node_count(), 4);
        assert_eq!(topology.links().len(), 5);
    }

    #[test]
    fn links_stay_valid_across_mixed_operations() {
        let mut topology = Topology::new();
        for step in 0..40u32 {
            let id = step % 7;
            match step % 3 {
                0 => {
                    let _ = topology.add_node(id, &format!("r{}", id), NodeKind::Router);
                }
                1 => {
                    let _ = topology.add_link(id, (id + 3) % 7, 1.0 + id as f64);
                }
                _ => {
                    let _ = topology.remove_node((id + 5) % 7);
                }
            }
            assert_links_valid(&topology);
        }
    }
}

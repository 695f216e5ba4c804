pub mod topology;

pub use topology::{Link, Node, NodeKind, TopoGraph, Topology, TopologySnapshot};

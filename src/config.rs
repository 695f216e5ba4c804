use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{bail, Context, Result};

use crate::algorithms::Algorithm;
use crate::NodeId;

/// Static description of the network, in the same shape as the
/// `network.json` file shared by the controller and every router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(rename = "Ports")]
    pub ports: BTreeMap<String, u16>,
    #[serde(rename = "Nodes")]
    pub nodes: BTreeMap<String, NodeId>,
    #[serde(rename = "Links")]
    pub links: Vec<LinkConfig>,
    #[serde(default = "default_host")]
    pub host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    pub from: NodeId,
    pub to: NodeId,
    pub distance: f64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl LinkConfig {
    // longer distances are preferred
    pub fn weight(&self) -> f64 {
        1.0 / self.distance
    }
}

impl NetworkConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading network description {}", path.display()))?;
        let config: NetworkConfig = serde_json::from_str(content.trim_start_matches('\u{feff}'))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.addr_for_port(0).is_none() {
            bail!("host {} is not an IP address", self.host);
        }
        for name in self.ports.keys() {
            if !self.nodes.contains_key(name) {
                bail!("router {} has a port but no node id", name);
            }
        }
        for name in self.nodes.keys() {
            if !self.ports.contains_key(name) {
                bail!("router {} has a node id but no port", name);
            }
        }

        let mut ids = HashSet::new();
        for (name, id) in &self.nodes {
            if !ids.insert(*id) {
                bail!("node id {} is used twice (last by {})", id, name);
            }
        }

        for link in &self.links {
            if link.distance == 0.0 || !link.distance.is_finite() {
                bail!("link {}-{} has invalid distance {}", link.from, link.to, link.distance);
            }
        }

        Ok(())
    }

    pub fn router_count(&self) -> usize {
        self.ports.len()
    }

    pub fn node_id(&self, router: &str) -> Option<NodeId> {
        self.nodes.get(router).copied()
    }

    pub fn port(&self, router: &str) -> Option<u16> {
        self.ports.get(router).copied()
    }

    pub fn router_addr(&self, router: &str) -> Option<SocketAddr> {
        let port = self.port(router)?;
        self.addr_for_port(port)
    }

    pub fn addr_for_port(&self, port: u16) -> Option<SocketAddr> {
        format!("{}:{}", self.host, port).parse().ok()
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub port: u16,
    pub algorithm: Algorithm,
    pub probe_interval: Duration,
    pub probe_timeout: Duration,
    pub push_timeout: Duration,
    pub state_dir: PathBuf,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            port: 8888,
            algorithm: Algorithm::Dijkstra,
            probe_interval: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(2),
            push_timeout: Duration::from_secs(5),
            state_dir: PathBuf::from("state"),
        }
    }
}

impl ControllerConfig {
    pub fn paths_file(&self) -> PathBuf {
        self.state_dir.join("controller").join("paths.json")
    }
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub name: String,
    pub controller_addr: SocketAddr,
    pub connect_timeout: Duration,
    pub state_dir: PathBuf,
}

impl RouterConfig {
    pub fn new(name: impl Into<String>, controller_addr: SocketAddr) -> Self {
        Self {
            name: name.into(),
            controller_addr,
            connect_timeout: Duration::from_secs(5),
            state_dir: PathBuf::from("state"),
        }
    }

    pub fn router_dir(&self) -> PathBuf {
        self.state_dir.join(&self.name)
    }

    pub fn paths_file(&self) -> PathBuf {
        self.router_dir().join("paths.json")
    }

    pub fn clients_file(&self) -> PathBuf {
        self.router_dir().join("clients.json")
    }
}

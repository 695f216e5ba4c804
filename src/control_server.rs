use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use futures::future::join_all;
use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::algorithms::{compute_all_pairs, Algorithm};
use crate::config::{ControllerConfig, NetworkConfig};
use crate::liveness;
use crate::network::{Node, NodeKind, Topology, TopologySnapshot};
use crate::persist;
use crate::protocol::{read_message, send_to, write_message, Cipher, ControlMessage, RoutingSnapshot};
use crate::{Error, Result, RouterName};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Pending { registered: usize, expected: usize },
    Complete,
    Duplicate,
    // arrived after completion, rejoining is not supported
    Late,
}

#[derive(Debug, Default)]
pub struct ControllerState {
    pub topology: Topology,
    pub roster: BTreeSet<RouterName>,
    pub snapshot: Option<Arc<RoutingSnapshot>>,
    version: u64,
    complete: bool,
}

impl ControllerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, router: &str, network: &NetworkConfig) -> Result<Registration> {
        if self.complete {
            return Ok(Registration::Late);
        }
        let id = network
            .node_id(router)
            .ok_or_else(|| Error::UnknownRouter(router.to_string()))?;
        if self.roster.contains(router) {
            return Ok(Registration::Duplicate);
        }

        self.topology.add_node(id, router, NodeKind::Router)?;
        self.roster.insert(router.to_string());

        let expected = network.router_count();
        if self.roster.len() < expected {
            return Ok(Registration::Pending { registered: self.roster.len(), expected });
        }

        self.complete = true;
        for link in &network.links {
            if let Err(e) = self.topology.add_link(link.from, link.to, link.weight()) {
                error!("{}", e);
            }
        }
        Ok(Registration::Complete)
    }

    // on failure the previous snapshot stays current
    pub fn recompute(&mut self, algorithm: Algorithm) -> Result<Arc<RoutingSnapshot>> {
        let entries = compute_all_pairs(&self.topology, algorithm)?;
        self.version += 1;
        let snapshot = Arc::new(RoutingSnapshot::new(self.version, entries));
        self.snapshot = Some(snapshot.clone());
        Ok(snapshot)
    }

    pub fn remove_router(&mut self, router: &str, network: &NetworkConfig) -> Result<Node> {
        let id = network
            .node_id(router)
            .ok_or_else(|| Error::UnknownRouter(router.to_string()))?;
        let node = self.topology.remove_node(id)?;
        self.roster.remove(router);
        Ok(node)
    }

    pub fn targets(&self, network: &NetworkConfig) -> Vec<(RouterName, SocketAddr)> {
        self.roster
            .iter()
            .filter_map(|name| network.router_addr(name).map(|addr| (name.clone(), addr)))
            .collect()
    }
}

pub struct Controller {
    config: ControllerConfig,
    network: Arc<NetworkConfig>,
    cipher: Arc<dyn Cipher>,
    state: Mutex<ControllerState>,
}

impl Controller {
    pub fn new(config: ControllerConfig, network: Arc<NetworkConfig>, cipher: Arc<dyn Cipher>) -> Self {
        Self {
            config,
            network,
            cipher,
            state: Mutex::new(ControllerState::new()),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn cipher(&self) -> &dyn Cipher {
        self.cipher.as_ref()
    }

    pub async fn topology(&self) -> TopologySnapshot {
        self.state.lock().await.topology.snapshot()
    }

    pub async fn snapshot(&self) -> Option<Arc<RoutingSnapshot>> {
        self.state.lock().await.snapshot.clone()
    }

    pub async fn roster(&self) -> Vec<RouterName> {
        self.state.lock().await.roster.iter().cloned().collect()
    }

    pub async fn targets(&self) -> Vec<(RouterName, SocketAddr)> {
        self.state.lock().await.targets(&self.network)
    }

    pub async fn register(self: &Arc<Self>, router: &str) -> Result<Registration> {
        let (outcome, distribution) = {
            let mut state = self.state.lock().await;
            let outcome = state.register(router, &self.network)?;
            let distribution = match outcome {
                Registration::Complete => match state.recompute(self.config.algorithm) {
                    Ok(snapshot) => Some((snapshot, state.targets(&self.network))),
                    Err(e) => {
                        error!("Initial path computation failed: {}", e);
                        None
                    }
                },
                _ => None,
            };
            (outcome, distribution)
        };

        match &outcome {
            Registration::Pending { registered, expected } => {
                info!("Router {} registered ({}/{})", router, registered, expected);
            }
            Registration::Duplicate => warn!("Router {} registered twice, ignoring", router),
            Registration::Late => warn!("Router {} registered after topology completion, ignoring", router),
            Registration::Complete => {
                info!("Router {} registered, topology complete", router);
                if let Some((snapshot, targets)) = distribution {
                    self.publish(snapshot, targets).await;
                }
                info!("Starting node status checking");
                tokio::spawn(liveness::run(self.clone()));
            }
        }

        Ok(outcome)
    }

    pub async fn remove_failed(&self, failed: &[RouterName]) {
        let distribution = {
            let mut state = self.state.lock().await;
            for router in failed {
                match state.remove_router(router, &self.network) {
                    Ok(node) => warn!("Router {} (id {}) marked down", node.name, node.id),
                    Err(e) => error!("Could not remove {}: {}", router, e),
                }
            }
            match state.recompute(self.config.algorithm) {
                Ok(snapshot) => Some((snapshot, state.targets(&self.network))),
                Err(e) => {
                    error!("Path recomputation failed, keeping previous snapshot: {}", e);
                    None
                }
            }
        };

        if let Some((snapshot, targets)) = distribution {
            self.publish(snapshot, targets).await;
        }
    }

    async fn publish(&self, snapshot: Arc<RoutingSnapshot>, targets: Vec<(RouterName, SocketAddr)>) {
        if let Err(e) = persist::write_json(&self.config.paths_file(), snapshot.as_ref()).await {
            warn!("Could not persist snapshot v{}: {}", snapshot.version, e);
        }
        self.distribute(&snapshot, &targets).await;
    }

    // returns how many routers accepted the push
    pub async fn distribute(&self, snapshot: &RoutingSnapshot, targets: &[(RouterName, SocketAddr)]) -> usize {
        let message = ControlMessage::PathPush(snapshot.clone());
        let pushes = targets.iter().map(|(name, addr)| {
            let message = &message;
            async move {
                let result = send_to(*addr, self.cipher.as_ref(), message, self.config.push_timeout).await;
                if let Err(e) = &result {
                    warn!("Failed to push paths to {} ({}): {}", name, addr, e);
                }
                result.is_ok()
            }
        });

        let delivered = join_all(pushes).await.into_iter().filter(|ok| *ok).count();
        info!(
            "Snapshot v{} ({} paths) pushed to {}/{} routers",
            snapshot.version,
            snapshot.entries.len(),
            delivered,
            targets.len()
        );
        delivered
    }
}

pub struct ControlServer {
    controller: Arc<Controller>,
    listener: TcpListener,
}

impl ControlServer {
    pub async fn bind(config: ControllerConfig, network: Arc<NetworkConfig>, cipher: Arc<dyn Cipher>) -> Result<Self> {
        let bind_addr = format!("{}:{}", network.host, config.port);
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Controller listening on {} using {}",
            listener.local_addr()?,
            config.algorithm
        );

        Ok(Self {
            controller: Arc::new(Controller::new(config, network, cipher)),
            listener,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn controller(&self) -> Arc<Controller> {
        self.controller.clone()
    }

    pub async fn start(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("Control connection from {}", addr);
                    let controller = self.controller.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_client(stream, controller).await {
                            error!("Error handling control client {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept control connection: {}", e);
                }
            }
        }
    }

    async fn handle_client(mut stream: TcpStream, controller: Arc<Controller>) -> Result<()> {
        let message = read_message(&mut stream, controller.cipher()).await?;

        match message {
            ControlMessage::Register { router } => {
                controller.register(&router).await?;
            }
            ControlMessage::TopologyQuery => {
                let reply = ControlMessage::TopologyReply(controller.topology().await);
                write_message(&mut stream, controller.cipher(), &reply).await?;
            }
            ControlMessage::SnapshotQuery => {
                let snapshot = controller.snapshot().await.map(|s| s.as_ref().clone());
                write_message(&mut stream, controller.cipher(), &ControlMessage::SnapshotReply(snapshot)).await?;
            }
            other => return Err(other.unexpected()),
        }

        Ok(())
    }
}

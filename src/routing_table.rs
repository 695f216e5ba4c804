use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use log::{debug, info, warn};
use tokio::sync::{Mutex, RwLock};

use crate::persist;
use crate::protocol::RoutingSnapshot;
use crate::{ClientPort, Result, RouterName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Stale { current: u64 },
}

/// The snapshot a router forwards with. Replaced wholesale, never patched.
#[derive(Debug)]
pub struct ForwardingTable {
    current: RwLock<Arc<RoutingSnapshot>>,
    file: Option<PathBuf>,
    // version last written to `file`
    persisted: Mutex<u64>,
}

impl ForwardingTable {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(RoutingSnapshot::empty())),
            file: None,
            persisted: Mutex::new(0),
        }
    }

    pub fn persisted(file: PathBuf) -> Self {
        Self {
            file: Some(file),
            ..Self::new()
        }
    }

    /// Installs `snapshot` unless an older version is offered.
    pub async fn apply(&self, snapshot: RoutingSnapshot) -> Result<ApplyOutcome> {
        let snapshot = Arc::new(snapshot);
        {
            let mut guard = self.current.write().await;
            if snapshot.version < guard.version {
                warn!(
                    "Ignoring stale snapshot v{} (current v{})",
                    snapshot.version, guard.version
                );
                return Ok(ApplyOutcome::Stale { current: guard.version });
            }
            *guard = snapshot.clone();
        }

        info!("Forwarding table updated to v{} with {} paths", snapshot.version, snapshot.entries.len());

        if let Some(file) = &self.file {
            let mut persisted = self.persisted.lock().await;
            if snapshot.version >= *persisted {
                persist::write_json(file, snapshot.as_ref()).await?;
                *persisted = snapshot.version;
                debug!("Snapshot v{} written to {}", snapshot.version, file.display());
            }
        }

        Ok(ApplyOutcome::Applied)
    }

    pub async fn current(&self) -> Arc<RoutingSnapshot> {
        self.current.read().await.clone()
    }

    pub async fn version(&self) -> u64 {
        self.current.read().await.version
    }
}

impl Default for ForwardingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct ClientDirectory {
    router: RouterName,
    clients: RwLock<BTreeMap<ClientPort, RouterName>>,
    file: Option<PathBuf>,
}

impl ClientDirectory {
    fn new(router: &str) -> Self {
        Self {
            router: router.to_string(),
            clients: RwLock::new(BTreeMap::new()),
            file: None,
        }
    }

    pub fn persisted(router: &str, file: PathBuf) -> Self {
        Self {
            file: Some(file),
            ..Self::new(router)
        }
    }

    pub async fn register(&self, port: ClientPort) -> Result<()> {
        // Held across the write so the file always reflects the latest map.
        let mut clients = self.clients.write().await;
        clients.insert(port, self.router.clone());
        info!("Client {} registered on {}", port, self.router);

        if let Some(file) = &self.file {
            persist::write_json(file, &*clients).await?;
        }
        Ok(())
    }

    pub async fn contains(&self, port: ClientPort) -> bool {
        self.clients.read().await.contains_key(&port)
    }
}

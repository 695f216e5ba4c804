use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::{NetworkConfig, RouterConfig};
use crate::protocol::{
    read_message, relay_chunks, send_to, write_message, Cipher, ControlMessage, DataMessage, RoutingSnapshot,
};
use crate::protocol::codec::connect;
use crate::routing_table::{ClientDirectory, ForwardingTable};
use crate::{ClientPort, Error, Result, RouterName};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hop {
    Local { client: ClientPort },
    Relay { router: RouterName },
}

/// A message addressed to `me` is never relayed and any other message is
/// never delivered locally.
pub fn classify(message: &DataMessage, me: &str, snapshot: &RoutingSnapshot) -> Result<Hop> {
    if message.dest_router == me {
        return Ok(Hop::Local { client: message.dest_client });
    }
    let router = snapshot.next_hop(me, &message.dest_router)?;
    Ok(Hop::Relay { router })
}

struct RouterContext {
    name: RouterName,
    network: Arc<NetworkConfig>,
    cipher: Arc<dyn Cipher>,
    table: Arc<ForwardingTable>,
    clients: Arc<ClientDirectory>,
    connect_timeout: Duration,
    shutdown: broadcast::Sender<()>,
}

pub struct Router {
    config: RouterConfig,
    context: Arc<RouterContext>,
    listener: TcpListener,
}

impl Router {
    // must run before register() so the first push finds us listening
    pub async fn bind(config: RouterConfig, network: Arc<NetworkConfig>, cipher: Arc<dyn Cipher>) -> Result<Self> {
        let addr = network
            .router_addr(&config.name)
            .ok_or_else(|| Error::UnknownRouter(config.name.clone()))?;
        let listener = TcpListener::bind(addr).await?;

        let (shutdown, _) = broadcast::channel(1);
        let context = RouterContext {
            name: config.name.clone(),
            network,
            cipher,
            table: Arc::new(ForwardingTable::persisted(config.paths_file())),
            clients: Arc::new(ClientDirectory::persisted(&config.name, config.clients_file())),
            connect_timeout: config.connect_timeout,
            shutdown,
        };

        Ok(Self {
            config,
            context: Arc::new(context),
            listener,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn forwarding_table(&self) -> Arc<ForwardingTable> {
        self.context.table.clone()
    }

    pub async fn register(&self) -> Result<()> {
        let message = ControlMessage::Register { router: self.config.name.clone() };
        send_to(
            self.config.controller_addr,
            self.context.cipher.as_ref(),
            &message,
            self.config.connect_timeout,
        )
        .await?;
        info!("{} waiting for the paths", self.config.name);
        Ok(())
    }

    pub async fn start(self) -> Result<()> {
        self.register().await?;
        self.serve().await
    }

    pub async fn serve(self) -> Result<()> {
        let mut shutdown_rx = self.context.shutdown.subscribe();
        info!("Router {} listening on {}", self.config.name, self.local_addr()?);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Router {} shutting down", self.config.name);
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            debug!("Connection between {} and {}", self.config.name, addr);
                            let context = self.context.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, &context).await {
                                    warn!("{}: connection from {} dropped: {}", context.name, addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

async fn handle_connection(mut stream: TcpStream, context: &RouterContext) -> Result<()> {
    let message = read_message(&mut stream, context.cipher.as_ref()).await?;

    match message {
        ControlMessage::Probe => {
            write_message(&mut stream, context.cipher.as_ref(), &ControlMessage::ProbeAck).await?;
        }
        ControlMessage::PathPush(snapshot) => {
            info!("The path v{} reached {}", snapshot.version, context.name);
            context.table.apply(snapshot).await?;
        }
        ControlMessage::RegisterClient { port } => {
            context.clients.register(port).await?;
        }
        ControlMessage::Shutdown => {
            let _ = context.shutdown.send(());
        }
        ControlMessage::Data(data) => {
            forward(stream, data, context).await?;
        }
        other => return Err(other.unexpected()),
    }

    Ok(())
}

async fn forward(mut upstream: TcpStream, message: DataMessage, context: &RouterContext) -> Result<()> {
    let snapshot = context.table.current().await;
    let hop = classify(&message, &context.name, &snapshot)?;

    let target = match &hop {
        Hop::Local { client } => {
            if !context.clients.contains(*client).await {
                warn!("Client {} never registered on {}, delivering anyway", client, context.name);
            }
            info!("Delivering message {} to local client {}", message.id, client);
            context.network.addr_for_port(*client)
        }
        Hop::Relay { router } => {
            info!("Message {} forwarded to {}", message.id, router);
            context.network.router_addr(router)
        }
    }
    .ok_or_else(|| Error::UnknownRouter(format!("{:?}", hop)))?;

    let cipher = context.cipher.as_ref();
    let mut downstream = connect(target, context.connect_timeout).await?;
    write_message(&mut downstream, cipher, &ControlMessage::Data(message.clone())).await?;

    if !message.is_attachment() {
        downstream.shutdown().await?;
        return Ok(());
    }

    match read_message(&mut downstream, cipher).await? {
        ControlMessage::Ready => {}
        other => return Err(other.unexpected()),
    }
    write_message(&mut upstream, cipher, &ControlMessage::Ready).await?;

    let bytes = relay_chunks(&mut upstream, &mut downstream, cipher).await?;
    info!("Relayed {} attachment bytes of message {}", bytes, message.id);
    Ok(())
}

//! Client side of the protocol, without any user interface.
//!
//! A client owns a listening port (its identifier), announces it to one
//! router and hands data messages to that router. Deliveries arrive on the
//! [`ClientInbox`].

use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::net::TcpListener;

use crate::network::TopologySnapshot;
use crate::protocol::codec::connect;
use crate::protocol::{
    read_message, receive_chunks, request, send_chunks, send_to, write_message, Cipher, ControlMessage,
    DataMessage, RoutingSnapshot,
};
use crate::{ClientPort, Result};

const TIMEOUT: Duration = Duration::from_secs(5);

pub async fn register_client(router: SocketAddr, port: ClientPort, cipher: &dyn Cipher) -> Result<()> {
    send_to(router, cipher, &ControlMessage::RegisterClient { port }, TIMEOUT).await
}

pub async fn send_text(router: SocketAddr, message: DataMessage, cipher: &dyn Cipher) -> Result<()> {
    send_to(router, cipher, &ControlMessage::Data(message), TIMEOUT).await
}

pub async fn send_attachment<R>(router: SocketAddr, message: DataMessage, data: &mut R, cipher: &dyn Cipher) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut stream = connect(router, TIMEOUT).await?;
    write_message(&mut stream, cipher, &ControlMessage::Data(message)).await?;

    match read_message(&mut stream, cipher).await? {
        ControlMessage::Ready => {}
        other => return Err(other.unexpected()),
    }
    send_chunks(data, &mut stream, cipher).await
}

pub async fn shutdown_router(router: SocketAddr, cipher: &dyn Cipher) -> Result<()> {
    send_to(router, cipher, &ControlMessage::Shutdown, TIMEOUT).await
}

pub async fn query_topology(controller: SocketAddr, cipher: &dyn Cipher) -> Result<TopologySnapshot> {
    match request(controller, cipher, &ControlMessage::TopologyQuery, TIMEOUT).await? {
        ControlMessage::TopologyReply(topology) => Ok(topology),
        other => Err(other.unexpected()),
    }
}

pub async fn query_snapshot(controller: SocketAddr, cipher: &dyn Cipher) -> Result<Option<RoutingSnapshot>> {
    match request(controller, cipher, &ControlMessage::SnapshotQuery, TIMEOUT).await? {
        ControlMessage::SnapshotReply(snapshot) => Ok(snapshot),
        other => Err(other.unexpected()),
    }
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: DataMessage,
    pub attachment: Option<Vec<u8>>,
}

pub struct ClientInbox {
    listener: TcpListener,
}

impl ClientInbox {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr).await?,
        })
    }

    pub fn port(&self) -> Result<ClientPort> {
        Ok(self.listener.local_addr()?.port())
    }

    // attachments are read up to their end marker
    pub async fn receive(&self, cipher: &dyn Cipher) -> Result<Delivery> {
        let (mut stream, _) = self.listener.accept().await?;
        let message = match read_message(&mut stream, cipher).await? {
            ControlMessage::Data(message) => message,
            other => return Err(other.unexpected()),
        };

        if !message.is_attachment() {
            return Ok(Delivery { message, attachment: None });
        }

        write_message(&mut stream, cipher, &ControlMessage::Ready).await?;
        let mut data = Vec::new();
        receive_chunks(&mut stream, &mut data, cipher).await?;
        Ok(Delivery { message, attachment: Some(data) })
    }
}

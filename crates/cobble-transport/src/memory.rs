//! In-process transport for tests and embedding.
//!
//! Frames travel over channels instead of a socket, so no bytes are
//! framed, compressed or encrypted. The negotiated settings are still
//! recorded and visible from the client end, which lets tests assert that
//! the server asked for them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use tokio::sync::{Mutex, mpsc};

use crate::{Connection, ConnectionId, Transport, TransportError};

#[derive(Debug, Default)]
struct LinkState {
    /// `-1` while compression is off.
    compression: AtomicI64,
    encrypted: AtomicBool,
    closed: AtomicBool,
}

impl LinkState {
    fn new() -> Self {
        Self {
            compression: AtomicI64::new(-1),
            ..Self::default()
        }
    }
}

/// What the server side of a memory link has switched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    pub compression: Option<u32>,
    pub encrypted: bool,
    pub closed: bool,
}

/// Creates a connected pair: the server end and the client end.
pub fn pair(id: ConnectionId) -> (MemoryConnection, MemoryClient) {
    let (to_server, from_client) = mpsc::unbounded_channel();
    let (to_client, from_server) = mpsc::unbounded_channel();
    let state = Arc::new(LinkState::new());
    let server = MemoryConnection {
        id,
        inbound: Mutex::new(from_client),
        outbound: to_client,
        state: Arc::clone(&state),
    };
    let client = MemoryClient {
        tx: Some(to_server),
        rx: from_server,
        state,
    };
    (server, client)
}

/// Server end of a memory link.
pub struct MemoryConnection {
    id: ConnectionId,
    inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    state: Arc<LinkState>,
}

impl Connection for MemoryConnection {
    type Error = TransportError;

    async fn send(&self, packet: &[u8]) -> Result<(), Self::Error> {
        if self.state.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed("link closed".into()));
        }
        self.outbound
            .send(packet.to_vec())
            .map_err(|_| TransportError::ConnectionClosed("client dropped".into()))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn set_compression(&self, threshold: Option<u32>) -> Result<(), Self::Error> {
        let raw = threshold.map_or(-1, i64::from);
        self.state.compression.store(raw, Ordering::Release);
        Ok(())
    }

    async fn enable_encryption(&self, _shared_secret: &[u8]) -> Result<(), Self::Error> {
        self.state.encrypted.store(true, Ordering::Release);
        Ok(())
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.state.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// Client end of a memory link.
pub struct MemoryClient {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    state: Arc<LinkState>,
}

impl MemoryClient {
    /// Sends one packet (opcode and body) to the server.
    pub fn send(&self, packet: impl Into<Vec<u8>>) -> Result<(), TransportError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| TransportError::ConnectionClosed("client hung up".into()))?;
        tx.send(packet.into())
            .map_err(|_| TransportError::ConnectionClosed("server dropped".into()))
    }

    /// Waits for the next packet from the server.
    ///
    /// Returns `None` once the server end is gone and the queue is empty.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// Returns a queued packet without waiting.
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.rx.try_recv().ok()
    }

    /// Ends the client's half, as if the socket were shut down.
    pub fn hang_up(&mut self) {
        self.tx = None;
    }

    pub fn settings(&self) -> LinkSettings {
        let compression = self.state.compression.load(Ordering::Acquire);
        LinkSettings {
            compression: u32::try_from(compression).ok(),
            encrypted: self.state.encrypted.load(Ordering::Acquire),
            closed: self.state.closed.load(Ordering::Acquire),
        }
    }
}

/// A [`Transport`] whose connections come from a [`MemoryConnector`].
pub struct MemoryTransport {
    incoming: mpsc::UnboundedReceiver<MemoryConnection>,
}

/// Opens links to a [`MemoryTransport`]. Cheap to clone.
#[derive(Clone)]
pub struct MemoryConnector {
    tx: mpsc::UnboundedSender<MemoryConnection>,
}

/// Creates a transport and the connector that feeds it.
pub fn listener() -> (MemoryTransport, MemoryConnector) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MemoryTransport { incoming: rx }, MemoryConnector { tx })
}

impl MemoryConnector {
    pub fn connect(&self) -> Result<MemoryClient, TransportError> {
        let (server, client) = pair(crate::next_connection_id());
        self.tx.send(server).map_err(|_| TransportError::Shutdown)?;
        Ok(client)
    }
}

impl Transport for MemoryTransport {
    type Connection = MemoryConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        self.incoming.recv().await.ok_or(TransportError::Shutdown)
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

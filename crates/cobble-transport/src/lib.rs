//! Transport abstraction layer for Cobble.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! where packets come from. A connection hands whole packets (opcode plus
//! body) up and takes whole packets down; length prefixes, compression and
//! encryption stay below this line.
//!
//! # Implementations
//!
//! - [`TcpTransport`]: the real thing, one framed byte stream per client.
//! - [`memory`]: channel-backed links for tests.
//!
//! The connection state machine only *decides* when compression and
//! encryption start; [`Connection::set_compression`] and
//! [`Connection::enable_encryption`] carry that decision out.

mod cipher;
mod error;
pub mod framing;
pub mod memory;
mod tcp;

pub use cipher::{CipherFactory, FrameCipher};
pub use error::TransportError;
pub use tcp::{TcpConnection, TcpTransport};

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_connection_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Waits for and accepts the next incoming connection.
    fn accept(&mut self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;

    /// Gracefully shuts down the transport, stopping new connections.
    fn shutdown(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// A single connection that carries whole packets.
///
/// Methods return `Send` futures so a generic connection can be driven
/// from a spawned task.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends one packet to the remote peer.
    fn send(&self, packet: &[u8]) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next packet from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed. Dropping
    /// the future before it completes loses no data.
    fn recv(&self) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    /// Compresses every later frame in both directions. `None` turns
    /// compression off.
    fn set_compression(
        &self,
        threshold: Option<u32>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Encrypts every later byte in both directions.
    fn enable_encryption(
        &self,
        shared_secret: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns the remote address, if the transport has one.
    fn peer_addr(&self) -> Option<SocketAddr>;
}

//! TCP transport: one framed byte stream per client.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::framing::{FrameDecoder, MAX_FRAME_LEN, encode_frame};
use crate::{CipherFactory, Connection, ConnectionId, FrameCipher, Transport, TransportError};

const READ_CHUNK: usize = 8192;

/// A TCP [`Transport`] that listens for incoming connections.
pub struct TcpTransport {
    listener: TcpListener,
    max_frame_len: usize,
    ciphers: Option<Arc<dyn CipherFactory>>,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "TCP transport listening");
        Ok(Self {
            listener,
            max_frame_len: MAX_FRAME_LEN,
            ciphers: None,
        })
    }

    /// Caps the length of inbound frames.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Installs the cipher used once a connection turns encryption on.
    pub fn with_ciphers(mut self, factory: Arc<dyn CipherFactory>) -> Self {
        self.ciphers = Some(factory);
        self
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        let id = crate::next_connection_id();
        tracing::debug!(%id, %peer, "accepted TCP connection");
        Ok(TcpConnection::new(
            id,
            stream,
            peer,
            self.max_frame_len,
            self.ciphers.clone(),
        ))
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

struct ReadState {
    half: OwnedReadHalf,
    decoder: FrameDecoder,
    cipher: Option<Box<dyn FrameCipher>>,
}

struct WriteState {
    half: OwnedWriteHalf,
    compression: Option<u32>,
    cipher: Option<Box<dyn FrameCipher>>,
}

/// A single framed TCP connection.
///
/// The read and write halves are locked separately so a writer never waits
/// on a pending read.
pub struct TcpConnection {
    id: ConnectionId,
    peer: SocketAddr,
    reader: Mutex<ReadState>,
    writer: Mutex<WriteState>,
    ciphers: Option<Arc<dyn CipherFactory>>,
}

impl TcpConnection {
    fn new(
        id: ConnectionId,
        stream: TcpStream,
        peer: SocketAddr,
        max_frame_len: usize,
        ciphers: Option<Arc<dyn CipherFactory>>,
    ) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%id, error = %e, "could not disable Nagle");
        }
        let (read, write) = stream.into_split();
        Self {
            id,
            peer,
            reader: Mutex::new(ReadState {
                half: read,
                decoder: FrameDecoder::new(max_frame_len),
                cipher: None,
            }),
            writer: Mutex::new(WriteState {
                half: write,
                compression: None,
                cipher: None,
            }),
            ciphers,
        }
    }

    /// Connects to a listening server. Used by clients and tests.
    pub async fn connect(addr: SocketAddr) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        Ok(Self::new(
            crate::next_connection_id(),
            stream,
            addr,
            MAX_FRAME_LEN,
            None,
        ))
    }
}

impl Connection for TcpConnection {
    type Error = TransportError;

    async fn send(&self, packet: &[u8]) -> Result<(), Self::Error> {
        let mut guard = self.writer.lock().await;
        let state = &mut *guard;
        let mut frame = encode_frame(packet, state.compression)?;
        if let Some(cipher) = &mut state.cipher {
            cipher.encrypt(&mut frame);
        }
        state
            .half
            .write_all(&frame)
            .await
            .map_err(TransportError::SendFailed)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut guard = self.reader.lock().await;
        let state = &mut *guard;
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(packet) = state.decoder.next_frame()? {
                return Ok(Some(packet));
            }
            let n = state
                .half
                .read(&mut chunk)
                .await
                .map_err(TransportError::ReceiveFailed)?;
            if n == 0 {
                if state.decoder.has_partial() {
                    return Err(TransportError::ConnectionClosed(
                        "stream ended inside a frame".into(),
                    ));
                }
                return Ok(None);
            }
            if let Some(cipher) = &mut state.cipher {
                cipher.decrypt(&mut chunk[..n]);
            }
            state.decoder.extend(&chunk[..n]);
        }
    }

    async fn set_compression(&self, threshold: Option<u32>) -> Result<(), Self::Error> {
        self.writer.lock().await.compression = threshold;
        self.reader.lock().await.decoder.set_compression(threshold);
        tracing::debug!(id = %self.id, ?threshold, "compression changed");
        Ok(())
    }

    async fn enable_encryption(&self, shared_secret: &[u8]) -> Result<(), Self::Error> {
        let factory = self.ciphers.as_ref().ok_or_else(|| {
            TransportError::EncryptionUnavailable("no cipher installed".into())
        })?;
        let write_cipher = factory.create(shared_secret)?;
        let read_cipher = factory.create(shared_secret)?;
        self.writer.lock().await.cipher = Some(write_cipher);
        self.reader.lock().await.cipher = Some(read_cipher);
        tracing::debug!(id = %self.id, "encryption enabled");
        Ok(())
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.writer
            .lock()
            .await
            .half
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::testing::XorFactory;

    async fn pair(ciphers: Option<Arc<dyn CipherFactory>>) -> (TcpConnection, TcpConnection) {
        let mut transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        if let Some(factory) = ciphers {
            transport = transport.with_ciphers(factory);
        }
        let addr = transport.local_addr().unwrap();
        let server = tokio::spawn(async move { transport.accept().await.unwrap() });
        let client = TcpConnection::connect(addr).await.unwrap();
        (server.await.unwrap(), client)
    }

    #[tokio::test]
    async fn test_send_recv_frames_cross_the_socket() {
        let (server, client) = pair(None).await;
        client.send(&[0x00, 0xfa]).await.unwrap();
        client.send(&[0x01]).await.unwrap();
        assert_eq!(server.recv().await.unwrap(), Some(vec![0x00, 0xfa]));
        assert_eq!(server.recv().await.unwrap(), Some(vec![0x01]));
    }

    #[tokio::test]
    async fn test_recv_after_peer_close_returns_none() {
        let (server, client) = pair(None).await;
        client.close().await.unwrap();
        drop(client);
        assert_eq!(server.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_compression_both_ends_round_trips_large_packets() {
        let (server, client) = pair(None).await;
        server.set_compression(Some(32)).await.unwrap();
        client.set_compression(Some(32)).await.unwrap();
        let big = vec![0x55; 4000];
        client.send(&big).await.unwrap();
        assert_eq!(server.recv().await.unwrap(), Some(big));
    }

    #[tokio::test]
    async fn test_enable_encryption_without_factory_fails() {
        let (server, _client) = pair(None).await;
        let err = server.enable_encryption(&[1; 16]).await.unwrap_err();
        assert!(matches!(err, TransportError::EncryptionUnavailable(_)));
    }

    #[tokio::test]
    async fn test_enable_encryption_with_factory_round_trips() {
        let factory: Arc<dyn CipherFactory> = Arc::new(XorFactory);
        let (server, client) = pair(Some(factory)).await;
        // The client side was built without a factory; give it one by
        // installing ciphers directly.
        client.writer.lock().await.cipher = Some(XorFactory.create(&[9; 16]).unwrap());
        server.enable_encryption(&[9; 16]).await.unwrap();
        client.send(b"\x03secret").await.unwrap();
        assert_eq!(server.recv().await.unwrap(), Some(b"\x03secret".to_vec()));
    }
}

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// A frame was malformed or larger than the configured maximum.
    #[error("bad frame: {0}")]
    BadFrame(String),

    /// Compressing or inflating a frame body failed.
    #[error("compression failed: {0}")]
    Compression(#[source] std::io::Error),

    /// Encryption was requested but no cipher is available.
    #[error("encryption unavailable: {0}")]
    EncryptionUnavailable(String),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}

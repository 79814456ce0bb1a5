//! Hook for stream encryption.
//!
//! The transport never picks a cipher itself. Deployments that run in
//! online mode install a [`CipherFactory`]; without one, a request to turn
//! encryption on fails with
//! [`TransportError::EncryptionUnavailable`](crate::TransportError::EncryptionUnavailable).

use crate::TransportError;

/// A stateful stream cipher applied to every byte after it is enabled.
///
/// Ciphers work in place and must not change the length of the data.
pub trait FrameCipher: Send + 'static {
    fn encrypt(&mut self, data: &mut [u8]);
    fn decrypt(&mut self, data: &mut [u8]);
}

/// Builds the ciphers for one connection from the negotiated shared secret.
pub trait CipherFactory: Send + Sync + 'static {
    /// Returns a fresh cipher keyed with `shared_secret`. Called twice per
    /// connection: once for the read half and once for the write half.
    fn create(&self, shared_secret: &[u8]) -> Result<Box<dyn FrameCipher>, TransportError>;
}

//! Identity verification hooks.
//!
//! Cobble never talks to an identity service itself. Login asks an
//! [`Authenticator`] who the player is; online-mode deployments also plug
//! in a [`ServerKey`] that owns the key pair used for the encryption
//! handshake.

use std::future::Future;

use cobble_protocol::GameProfile;
use sha1::{Digest, Sha1};
use uuid::Uuid;

use crate::SessionError;

/// Validates a player's identity during login.
///
/// # Example
///
/// ```rust
/// use cobble_protocol::GameProfile;
/// use cobble_session::{Authenticator, SessionError, offline_uuid};
///
/// /// Lets in only names on a fixed list.
/// struct Allowlist(Vec<String>);
///
/// impl Authenticator for Allowlist {
///     async fn verify(
///         &self,
///         name: &str,
///         _server_hash: &str,
///         _online_mode: bool,
///     ) -> Result<GameProfile, SessionError> {
///         if !self.0.iter().any(|n| n == name) {
///             return Err(SessionError::AuthFailed(format!("{name} is not listed")));
///         }
///         Ok(GameProfile::new(offline_uuid(name), name))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Returns the profile for `name`.
    ///
    /// `server_hash` is the hex digest from [`server_hash`] when
    /// `online_mode` is set, and empty otherwise.
    fn verify(
        &self,
        name: &str,
        server_hash: &str,
        online_mode: bool,
    ) -> impl Future<Output = Result<GameProfile, SessionError>> + Send;
}

/// Accepts every name and derives a stable UUID from it.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineAuthenticator;

impl Authenticator for OfflineAuthenticator {
    async fn verify(
        &self,
        name: &str,
        _server_hash: &str,
        online_mode: bool,
    ) -> Result<GameProfile, SessionError> {
        if online_mode {
            return Err(SessionError::AuthFailed(
                "offline authenticator cannot verify online sessions".into(),
            ));
        }
        Ok(GameProfile::new(offline_uuid(name), name))
    }
}

/// The UUID an offline-mode player named `name` gets.
pub fn offline_uuid(name: &str) -> Uuid {
    Uuid::new_v3(
        &Uuid::NAMESPACE_URL,
        format!("OfflinePlayer:{name}").as_bytes(),
    )
}

/// The server's key pair for the login encryption handshake.
pub trait ServerKey: Send + Sync + 'static {
    /// DER-encoded public key sent in the encryption request.
    fn public_key_der(&self) -> &[u8];

    /// Decrypts a value the client encrypted with the public key.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, SessionError>;
}

/// Digest the client and the identity service both compute to prove the
/// player joined this server.
///
/// SHA-1 over the server id, shared secret and public key, printed as a
/// signed big-endian integer in lowercase hex without leading zeros.
pub fn server_hash(server_id: &str, shared_secret: &[u8], public_key: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(server_id.as_bytes());
    hasher.update(shared_secret);
    hasher.update(public_key);
    let mut digest = [0u8; 20];
    digest.copy_from_slice(&hasher.finalize());

    let negative = digest[0] & 0x80 != 0;
    if negative {
        // Two's complement: invert, then add one from the low end.
        let mut carry = true;
        for byte in digest.iter_mut().rev() {
            *byte = !*byte;
            if carry {
                let (sum, overflow) = byte.overflowing_add(1);
                *byte = sum;
                carry = overflow;
            }
        }
    }

    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    let trimmed = hex.trim_start_matches('0');
    let magnitude = if trimmed.is_empty() { "0" } else { trimmed };
    if negative {
        format!("-{magnitude}")
    } else {
        magnitude.to_owned()
    }
}

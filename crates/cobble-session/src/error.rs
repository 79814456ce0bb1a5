//! Error types for the session layer.

use uuid::Uuid;

/// Errors that can occur while establishing or managing a player session.
///
/// Authentication variants are fatal to the connection that raised them
/// and are reported to the player with a reason distinct from a decode
/// failure.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The [`Authenticator`](crate::Authenticator) rejected the player.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The echoed verify token did not match the one the server issued.
    #[error("verify token mismatch")]
    VerifyTokenMismatch,

    /// The server key could not decrypt the client's encryption response.
    #[error("key decryption failed: {0}")]
    KeyDecryption(String),

    /// Another session already holds this identity and the conflict policy
    /// rejects newcomers.
    #[error("{name} ({uuid}) is already connected")]
    Conflict { name: String, uuid: Uuid },

    /// The connection behind a [`SessionHandle`](crate::SessionHandle) is
    /// gone.
    #[error("session handle closed")]
    HandleClosed,

    /// The connection did not act on a control request in time.
    #[error("session did not respond within {0} ms")]
    Unresponsive(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_conflict_names_player() {
        let err = SessionError::Conflict {
            name: "Steve".into(),
            uuid: Uuid::nil(),
        };
        assert!(err.to_string().starts_with("Steve"));
    }

    #[test]
    fn test_display_auth_and_token_errors_differ() {
        let auth = SessionError::AuthFailed("bad session".into()).to_string();
        let token = SessionError::VerifyTokenMismatch.to_string();
        assert_ne!(auth, token);
    }
}

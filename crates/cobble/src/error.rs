//! Unified error type for Cobble, and why a connection was closed.

use std::fmt;

use cobble_plugin::RegistrationError;
use cobble_protocol::{DecodeError, EncodeError, ProtocolError, ProtocolVersion, Text};
use cobble_session::SessionError;
use cobble_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors, so callers of the meta crate handle one type.
#[derive(Debug, thiserror::Error)]
pub enum CobbleError {
    /// A transport-level error (bind, send, recv, framing).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (authentication, conflict, closed handle).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Plugins could not be registered.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// The server configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DecodeError> for CobbleError {
    fn from(err: DecodeError) -> Self {
        Self::Protocol(err.into())
    }
}

impl From<EncodeError> for CobbleError {
    fn from(err: EncodeError) -> Self {
        Self::Protocol(err.into())
    }
}

impl From<serde_json::Error> for CobbleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Why the server ended a connection.
///
/// Every fatal condition is classified into one of these before the
/// connection closes; [`message`](Self::message) is what the player sees.
#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectReason {
    /// A frame did not decode against the active catalog.
    Decode(String),
    /// The player's identity could not be verified.
    Authentication(String),
    /// The identity is already online and the policy refuses newcomers.
    Conflict,
    /// Keep-alives went unanswered, or login took too long.
    Timeout,
    /// The client sent something the current stage does not allow.
    ProtocolViolation(String),
    /// A required resource pack was declined or failed to load.
    ResourcePackRejected,
    /// A plugin refused the login.
    Vetoed(Text),
    /// Another part of the server asked for the disconnect.
    Kicked(Text),
    /// The handshake named a protocol this server does not speak.
    UnsupportedVersion(i32),
    /// The server could not produce a packet it needed.
    Internal(String),
}

impl DisconnectReason {
    pub fn message(&self) -> Text {
        match self {
            Self::Decode(detail) => Text::plain(format!("Invalid packet: {detail}")),
            Self::Authentication(_) => {
                Text::translate("multiplayer.disconnect.unverified_username", Vec::new())
            }
            Self::Conflict => Text::translate("multiplayer.disconnect.name_taken", Vec::new()),
            Self::Timeout => Text::translate("disconnect.timeout", Vec::new()),
            Self::ProtocolViolation(detail) => Text::plain(format!("Protocol violation: {detail}")),
            Self::ResourcePackRejected => {
                Text::translate("multiplayer.requiredTexturePrompt.disconnect", Vec::new())
            }
            Self::Vetoed(reason) | Self::Kicked(reason) => reason.clone(),
            Self::Internal(_) => Text::plain("Internal server error"),
            Self::UnsupportedVersion(_) => {
                let supported: Vec<String> = ProtocolVersion::ALL
                    .iter()
                    .map(|v| format!("{} ({})", v.release_name(), v.number()))
                    .collect();
                Text::plain(format!(
                    "Unsupported protocol version. This server speaks {}",
                    supported.join(", ")
                ))
            }
        }
    }

    /// Short label for logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Authentication(_) => "authentication",
            Self::Conflict => "conflict",
            Self::Timeout => "timeout",
            Self::ProtocolViolation(_) => "protocol_violation",
            Self::ResourcePackRejected => "resource_pack",
            Self::Vetoed(_) => "vetoed",
            Self::Kicked(_) => "kicked",
            Self::UnsupportedVersion(_) => "unsupported_version",
            Self::Internal(_) => "internal",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(detail)
            | Self::Authentication(detail)
            | Self::ProtocolViolation(detail)
            | Self::Internal(detail) => write!(f, "{}: {detail}", self.kind()),
            Self::Vetoed(reason) | Self::Kicked(reason) => {
                write!(f, "{}: {}", self.kind(), reason.to_plain())
            }
            Self::UnsupportedVersion(number) => write!(f, "{}: {number}", self.kind()),
            Self::Conflict | Self::Timeout | Self::ResourcePackRejected => {
                f.write_str(self.kind())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let cobble_err: CobbleError = err.into();
        assert!(matches!(cobble_err, CobbleError::Transport(_)));
        assert!(cobble_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_decode_error_goes_through_protocol() {
        let cobble_err: CobbleError = DecodeError::InvalidUtf8.into();
        assert!(matches!(
            cobble_err,
            CobbleError::Protocol(ProtocolError::Decode(DecodeError::InvalidUtf8))
        ));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::AuthFailed("nope".into());
        let cobble_err: CobbleError = err.into();
        assert!(matches!(cobble_err, CobbleError::Session(_)));
    }

    #[test]
    fn test_from_json_error_is_config() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        let cobble_err: CobbleError = err.into();
        assert!(matches!(cobble_err, CobbleError::Config(_)));
    }

    #[test]
    fn test_authentication_reason_differs_from_decode() {
        let auth = DisconnectReason::Authentication("bad token".into()).message();
        let decode = DisconnectReason::Decode("bad opcode".into()).message();
        assert_ne!(auth, decode);
        assert!(decode.to_plain().contains("bad opcode"));
    }

    #[test]
    fn test_unsupported_version_names_supported_numbers() {
        let text = DisconnectReason::UnsupportedVersion(4).message().to_plain();
        assert!(text.contains("765"));
        assert!(text.contains("766"));
    }

    #[test]
    fn test_display_includes_kind() {
        assert_eq!(DisconnectReason::Timeout.to_string(), "timeout");
        assert_eq!(
            DisconnectReason::Kicked(Text::plain("bye")).to_string(),
            "kicked: bye"
        );
    }
}

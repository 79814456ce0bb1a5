//! Session types: configuration and the per-connection record.
//!
//! [`ConnectionData`] is the server's view of one client. It is owned by
//! the task that drives the connection and is never shared: other
//! connections reach it only through a [`SessionHandle`](crate::SessionHandle).

use std::collections::HashMap;
use std::time::Instant;

use cobble_protocol::packets::common::ClientInformation;
use cobble_protocol::{GameProfile, ProtocolVersion};
use cobble_transport::ConnectionId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// What happens when a player logs in while their identity is still
/// connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Refuse the newcomer; existing sessions are untouched.
    RejectNew,
    /// Disconnect every existing session with the identity, then admit the
    /// newcomer.
    #[default]
    KickExisting,
}

/// Configuration for session behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub conflict_policy: ConflictPolicy,

    /// How long a kicked session gets to send its disconnect before the
    /// newcomer's login carries on without it.
    pub kick_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::KickExisting,
            kick_timeout_ms: 5_000,
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionData
// ---------------------------------------------------------------------------

/// Keep-alive bookkeeping for one connection.
#[derive(Debug, Clone, Default)]
pub struct KeepAliveTiming {
    /// The nonce the client must echo, and when it was sent.
    pub pending: Option<(i64, Instant)>,
    /// When the last keep-alive went out.
    pub last_sent: Option<Instant>,
    /// Maintenance cycles that found the pending nonce overdue.
    pub missed: u32,
    /// Round trip of the last matching reply.
    pub latency_ms: Option<u32>,
}

/// A resource pack the client has been asked to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPack {
    /// A required pack that fails or is declined ends the connection.
    pub required: bool,
}

/// Everything the server tracks about one connection.
#[derive(Debug, Clone)]
pub struct ConnectionData {
    pub id: ConnectionId,
    pub version: ProtocolVersion,
    /// Set once login has verified the player.
    pub profile: Option<GameProfile>,
    /// Locale, view distance and the other client settings.
    pub client_information: ClientInformation,
    /// What the client reported on the brand channel.
    pub brand: Option<String>,
    pub keepalive: KeepAliveTiming,
    /// The teleport id the client must accept next.
    pub pending_teleport: Option<i32>,
    /// The ping id the client must answer next.
    pub pending_ping: Option<i32>,
    pub resource_packs: HashMap<Uuid, PendingPack>,
}

impl ConnectionData {
    pub fn new(id: ConnectionId, version: ProtocolVersion) -> Self {
        Self {
            id,
            version,
            profile: None,
            client_information: ClientInformation::default(),
            brand: None,
            keepalive: KeepAliveTiming::default(),
            pending_teleport: None,
            pending_ping: None,
            resource_packs: HashMap::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.profile.as_ref().map(|p| p.name.as_str())
    }

    pub fn uuid(&self) -> Option<Uuid> {
        self.profile.as_ref().map(|p| p.uuid)
    }

    pub fn locale(&self) -> &str {
        self.client_information.locale.as_str()
    }

    pub fn view_distance(&self) -> i8 {
        self.client_information.view_distance
    }

    pub fn latency_ms(&self) -> Option<u32> {
        self.keepalive.latency_ms
    }

    /// Whether a required pack has been pushed and not yet resolved.
    pub fn mandatory_pack_outstanding(&self) -> bool {
        self.resource_packs.values().any(|pack| pack.required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> ConnectionData {
        ConnectionData::new(ConnectionId::new(1), ProtocolVersion::V766)
    }

    #[test]
    fn test_new_record_has_no_identity() {
        let record = data();
        assert!(record.name().is_none());
        assert!(record.uuid().is_none());
        assert_eq!(record.locale(), "en_us");
        assert!(record.latency_ms().is_none());
    }

    #[test]
    fn test_mandatory_pack_outstanding_ignores_optional_packs() {
        let mut record = data();
        record
            .resource_packs
            .insert(Uuid::from_u128(1), PendingPack { required: false });
        assert!(!record.mandatory_pack_outstanding());
        record
            .resource_packs
            .insert(Uuid::from_u128(2), PendingPack { required: true });
        assert!(record.mandatory_pack_outstanding());
    }

    #[test]
    fn test_session_config_default_kicks_existing() {
        let config = SessionConfig::default();
        assert_eq!(config.conflict_policy, ConflictPolicy::KickExisting);
        assert_eq!(config.kick_timeout_ms, 5_000);
    }

    #[test]
    fn test_conflict_policy_serializes_snake_case() {
        let json = serde_json::to_string(&ConflictPolicy::RejectNew).unwrap();
        assert_eq!(json, "\"reject_new\"");
        let config: SessionConfig =
            serde_json::from_str(r#"{"conflict_policy":"kick_existing"}"#).unwrap();
        assert_eq!(config.conflict_policy, ConflictPolicy::KickExisting);
        assert_eq!(config.kick_timeout_ms, 5_000);
    }
}

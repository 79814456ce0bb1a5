//! Protocol versions, packet directions and connection stages.
//!
//! Together these three values (plus an opcode) are the lookup key of the
//! packet catalog. Opcodes on their own mean nothing: the same number is
//! reused for unrelated packets across stages and versions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A protocol version the server can speak.
///
/// Each version owns an independent catalog. Nothing in the codec assumes
/// one version's opcode numbering applies to another.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "i32", into = "i32")]
pub enum ProtocolVersion {
    /// 1.20.3 and 1.20.4.
    V765,
    /// 1.20.5 and 1.20.6. Adds cookies, transfers and known packs.
    V766,
}

impl ProtocolVersion {
    /// Every supported version, oldest first.
    pub const ALL: [ProtocolVersion; 2] = [ProtocolVersion::V765, ProtocolVersion::V766];

    /// The newest supported version.
    pub const LATEST: ProtocolVersion = ProtocolVersion::V766;

    /// Returns the protocol number sent in the handshake.
    pub fn number(self) -> i32 {
        match self {
            Self::V765 => 765,
            Self::V766 => 766,
        }
    }

    /// Looks up a version by its handshake number.
    pub fn from_number(number: i32) -> Option<Self> {
        match number {
            765 => Some(Self::V765),
            766 => Some(Self::V766),
            _ => None,
        }
    }

    /// Returns the game release name shown to players.
    pub fn release_name(self) -> &'static str {
        match self {
            Self::V765 => "1.20.4",
            Self::V766 => "1.20.6",
        }
    }

    /// Whether this version has the cookie, transfer and known-pack packets.
    pub fn has_cookies(self) -> bool {
        self >= Self::V766
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl TryFrom<i32> for ProtocolVersion {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_number(value).ok_or_else(|| format!("unsupported protocol version {value}"))
    }
}

impl From<ProtocolVersion> for i32 {
    fn from(version: ProtocolVersion) -> Self {
        version.number()
    }
}

/// Which side sent a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client to server.
    Serverbound,
    /// Server to client.
    Clientbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serverbound => write!(f, "serverbound"),
            Self::Clientbound => write!(f, "clientbound"),
        }
    }
}

/// The connection stage that decides which catalog is active.
///
/// ```text
/// Login ──→ Configuration ⇄ Play
/// ```
///
/// There is no way back into `Login`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Login,
    Configuration,
    Play,
}

impl Stage {
    /// Returns `true` if moving from `self` to `target` is a legal edge.
    pub fn can_transition_to(self, target: Stage) -> bool {
        matches!(
            (self, target),
            (Stage::Login, Stage::Configuration)
                | (Stage::Configuration, Stage::Play)
                | (Stage::Play, Stage::Configuration)
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login => write!(f, "login"),
            Self::Configuration => write!(f, "configuration"),
            Self::Play => write!(f, "play"),
        }
    }
}

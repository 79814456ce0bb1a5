//! Server configuration.
//!
//! Every field has a default, so a config file only names what it
//! changes. Durations are plain millisecond counts to keep the JSON flat.

use std::path::Path;
use std::time::Duration;

use cobble_protocol::Ident;
use cobble_session::SessionConfig;
use cobble_transport::framing::MAX_FRAME_LEN;
use serde::{Deserialize, Serialize};

use crate::CobbleError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,

    /// Verify players through the encryption handshake and the identity
    /// service. Needs a server key.
    pub online_mode: bool,

    /// Packets at least this long are compressed. `None` leaves
    /// compression off.
    pub compression_threshold: Option<u32>,

    pub max_frame_len: usize,

    /// How long a new connection has to send its handshake.
    pub handshake_timeout_ms: u64,

    /// How long login may take, from the handshake to the acknowledgement.
    pub login_timeout_ms: u64,

    pub keepalive_interval_ms: u64,

    /// Maintenance cycles an overdue keep-alive may stay unanswered before
    /// the connection is dropped.
    pub max_missed_keepalives: u32,

    /// How often idle maintenance runs on every connection.
    pub maintenance_interval_ms: u64,

    /// Reported on the `minecraft:brand` channel.
    pub brand: String,

    pub session: SessionConfig,

    pub world: WorldConfig,

    pub resource_pack: Option<ResourcePackConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:25565".to_string(),
            online_mode: false,
            compression_threshold: Some(256),
            max_frame_len: MAX_FRAME_LEN,
            handshake_timeout_ms: 5_000,
            login_timeout_ms: 30_000,
            keepalive_interval_ms: 15_000,
            max_missed_keepalives: 15,
            maintenance_interval_ms: 1_000,
            brand: "cobble".to_string(),
            session: SessionConfig::default(),
            world: WorldConfig::default(),
            resource_pack: None,
        }
    }
}

impl ServerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, CobbleError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CobbleError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks what serde cannot: identifiers, and intervals that must not
    /// be zero.
    pub fn validate(&self) -> Result<(), CobbleError> {
        self.world.dimension()?;
        self.world.dimension_type()?;
        if self.keepalive_interval_ms == 0 || self.maintenance_interval_ms == 0 {
            return Err(CobbleError::Config(
                "keep-alive and maintenance intervals must be positive".into(),
            ));
        }
        if let Some(pack) = &self.resource_pack {
            if pack.hash.len() > 40 {
                return Err(CobbleError::Config(
                    "resource pack hash is longer than 40 characters".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    #[default]
    Survival,
    Creative,
    Adventure,
    Spectator,
}

impl GameMode {
    pub fn id(self) -> u8 {
        match self {
            Self::Survival => 0,
            Self::Creative => 1,
            Self::Adventure => 2,
            Self::Spectator => 3,
        }
    }
}

/// What a joining player is told about the world.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub max_players: i32,
    pub view_distance: i32,
    pub simulation_distance: i32,
    pub game_mode: GameMode,
    pub hardcore: bool,
    pub reduced_debug_info: bool,
    pub enforces_secure_chat: bool,
    /// The dimension players spawn in.
    pub dimension: String,
    /// Its dimension type.
    pub dimension_type: String,
    /// Block coordinates of the spawn point.
    pub spawn: [i32; 3],
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            max_players: 20,
            view_distance: 10,
            simulation_distance: 10,
            game_mode: GameMode::Survival,
            hardcore: false,
            reduced_debug_info: false,
            enforces_secure_chat: false,
            dimension: "minecraft:overworld".to_string(),
            dimension_type: "minecraft:overworld".to_string(),
            spawn: [0, 64, 0],
        }
    }
}

impl WorldConfig {
    pub fn dimension(&self) -> Result<Ident, CobbleError> {
        parse_ident("dimension", &self.dimension)
    }

    pub fn dimension_type(&self) -> Result<Ident, CobbleError> {
        parse_ident("dimension_type", &self.dimension_type)
    }
}

fn parse_ident(field: &str, value: &str) -> Result<Ident, CobbleError> {
    value
        .parse()
        .map_err(|e| CobbleError::Config(format!("{field}: {e}")))
}

/// A resource pack every player is asked to apply during configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePackConfig {
    pub url: String,
    /// Lowercase hex SHA-1 of the pack, or empty to skip the check.
    #[serde(default)]
    pub hash: String,
    /// Players who decline or fail to load it are disconnected.
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub prompt: Option<String>,
}

fn default_required() -> bool {
    true
}

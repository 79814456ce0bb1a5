//! Packets the server sends during play.
//!
//! Only shapes the server actually produces are modelled. The opcode
//! layout is therefore sparse, but every opcode listed is the real one.

use uuid::Uuid;

use crate::codec::{Decode, Encode, Reader, VarInt, Writer};
use crate::error::{DecodeError, EncodeError};
use crate::packets::common::{
    ClientboundCustomPayload, CookieRequest, Disconnect, KeepAlive, Ping, ResourcePackPop,
    ResourcePackPush, StoreCookie, Transfer,
};
use crate::packets::play::commands::Commands;
use crate::packets::play::player_info::PlayerInfoUpdate;
use crate::text::Text;
use crate::types::{BlockPos, Ident, Str, read_discriminant};

packet! {
    /// Opens and closes a bundle. Never sent on its own.
    pub struct BundleDelimiter {}
}

/// A boss bar change.
#[derive(Debug, Clone, PartialEq)]
pub enum BossEventOperation {
    Add {
        title: Text,
        progress: f32,
        color: VarInt,
        overlay: VarInt,
        flags: u8,
    },
    Remove,
    UpdateProgress(f32),
    UpdateName(Text),
    UpdateStyle { color: VarInt, overlay: VarInt },
    UpdateProperties(u8),
}

impl Encode for BossEventOperation {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        match self {
            Self::Add {
                title,
                progress,
                color,
                overlay,
                flags,
            } => {
                VarInt(0).encode(w)?;
                title.encode(w)?;
                progress.encode(w)?;
                color.encode(w)?;
                overlay.encode(w)?;
                flags.encode(w)
            }
            Self::Remove => VarInt(1).encode(w),
            Self::UpdateProgress(progress) => {
                VarInt(2).encode(w)?;
                progress.encode(w)
            }
            Self::UpdateName(title) => {
                VarInt(3).encode(w)?;
                title.encode(w)
            }
            Self::UpdateStyle { color, overlay } => {
                VarInt(4).encode(w)?;
                color.encode(w)?;
                overlay.encode(w)
            }
            Self::UpdateProperties(flags) => {
                VarInt(5).encode(w)?;
                flags.encode(w)
            }
        }
    }
}

impl Decode for BossEventOperation {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(match read_discriminant(r)? {
            0 => Self::Add {
                title: Text::decode(r)?,
                progress: f32::decode(r)?,
                color: VarInt::decode(r)?,
                overlay: VarInt::decode(r)?,
                flags: u8::decode(r)?,
            },
            1 => Self::Remove,
            2 => Self::UpdateProgress(f32::decode(r)?),
            3 => Self::UpdateName(Text::decode(r)?),
            4 => Self::UpdateStyle {
                color: VarInt::decode(r)?,
                overlay: VarInt::decode(r)?,
            },
            5 => Self::UpdateProperties(u8::decode(r)?),
            other => {
                return Err(DecodeError::UnknownDiscriminant {
                    ty: "BossEventOperation",
                    value: i64::from(other),
                });
            }
        })
    }
}

packet! {
    pub struct BossEvent {
        pub id: Uuid,
        pub operation: BossEventOperation,
    }
}

packet! {
    pub struct ChangeDifficulty {
        pub difficulty: u8,
        pub locked: bool,
    }
}

packet! {
    pub struct ChunkBatchFinished {
        pub batch_size: VarInt,
    }
}

packet! {
    pub struct ChunkBatchStart {}
}

packet! {
    pub struct ClearTitles {
        pub reset: bool,
    }
}

packet! {
    pub struct Suggestion {
        pub text: Str,
        pub tooltip: Option<Text>,
    }
}

packet! {
    /// Answer to a command suggestion request.
    pub struct CommandSuggestions {
        pub transaction_id: VarInt,
        pub start: VarInt,
        pub length: VarInt,
        pub matches: Vec<Suggestion>,
    }
}

packet! {
    /// Protocol 766 only.
    pub struct DebugSample {
        pub sample: Vec<i64>,
        pub sample_type: VarInt,
    }
}

packet! {
    pub struct GameEvent {
        pub event: u8,
        pub param: f32,
    }
}

impl GameEvent {
    /// Tells the client to wait for chunks before leaving the loading screen.
    pub const LEVEL_CHUNKS_LOAD_START: u8 = 13;
}

/// The dimension type a spawn refers to.
///
/// Protocol 765 names it; protocol 766 refers to it by registry index.
#[derive(Debug, Clone, PartialEq)]
pub enum DimensionType {
    Named(Ident),
    Id(VarInt),
}

impl Encode for DimensionType {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        match (self, w.version().has_cookies()) {
            (Self::Named(name), false) => name.encode(w),
            (Self::Id(id), true) => id.encode(w),
            _ => Err(EncodeError::OutOfRange {
                ty: "DimensionType",
                detail: format!("wrong reference form for protocol {}", w.version()),
            }),
        }
    }
}

impl Decode for DimensionType {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        if r.version().has_cookies() {
            VarInt::decode(r).map(Self::Id)
        } else {
            Ident::decode(r).map(Self::Named)
        }
    }
}

packet! {
    pub struct DeathLocation {
        pub dimension: Ident,
        pub pos: BlockPos,
    }
}

packet! {
    /// Spawn information shared by the login and respawn packets.
    pub struct SpawnInfo {
        pub dimension_type: DimensionType,
        pub dimension: Ident,
        pub hashed_seed: i64,
        pub game_mode: u8,
        pub previous_game_mode: i8,
        pub is_debug: bool,
        pub is_flat: bool,
        pub last_death: Option<DeathLocation>,
        pub portal_cooldown: VarInt,
    }
}

/// Puts the client into the world.
#[derive(Debug, Clone, PartialEq)]
pub struct Login {
    pub entity_id: i32,
    pub hardcore: bool,
    pub dimensions: Vec<Ident>,
    pub max_players: VarInt,
    pub view_distance: VarInt,
    pub simulation_distance: VarInt,
    pub reduced_debug_info: bool,
    pub show_death_screen: bool,
    pub limited_crafting: bool,
    pub spawn: SpawnInfo,
    /// Protocol 766 only.
    pub enforces_secure_chat: bool,
}

impl Encode for Login {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        self.entity_id.encode(w)?;
        self.hardcore.encode(w)?;
        self.dimensions.encode(w)?;
        self.max_players.encode(w)?;
        self.view_distance.encode(w)?;
        self.simulation_distance.encode(w)?;
        self.reduced_debug_info.encode(w)?;
        self.show_death_screen.encode(w)?;
        self.limited_crafting.encode(w)?;
        self.spawn.encode(w)?;
        if w.version().has_cookies() {
            self.enforces_secure_chat.encode(w)?;
        }
        Ok(())
    }
}

impl Decode for Login {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            entity_id: i32::decode(r)?,
            hardcore: bool::decode(r)?,
            dimensions: Vec::decode(r)?,
            max_players: VarInt::decode(r)?,
            view_distance: VarInt::decode(r)?,
            simulation_distance: VarInt::decode(r)?,
            reduced_debug_info: bool::decode(r)?,
            show_death_screen: bool::decode(r)?,
            limited_crafting: bool::decode(r)?,
            spawn: SpawnInfo::decode(r)?,
            enforces_secure_chat: if r.version().has_cookies() {
                bool::decode(r)?
            } else {
                false
            },
        })
    }
}

packet! {
    pub struct PongResponse {
        pub payload: i64,
    }
}

packet! {
    pub struct PlayerAbilities {
        pub flags: u8,
        pub flying_speed: f32,
        pub walking_speed: f32,
    }
}

packet! {
    pub struct PlayerInfoRemove {
        pub uuids: Vec<Uuid>,
    }
}

packet! {
    /// Moves the player. The client must confirm with the same teleport id.
    pub struct PlayerPosition {
        pub x: f64,
        pub y: f64,
        pub z: f64,
        pub yaw: f32,
        pub pitch: f32,
        pub relative: u8,
        pub teleport_id: VarInt,
    }
}

packet! {
    pub struct SetActionBarText {
        pub text: Text,
    }
}

packet! {
    pub struct SetChunkCacheCenter {
        pub x: VarInt,
        pub z: VarInt,
    }
}

packet! {
    pub struct SetChunkCacheRadius {
        pub radius: VarInt,
    }
}

packet! {
    pub struct SetDefaultSpawnPosition {
        pub pos: BlockPos,
        pub angle: f32,
    }
}

packet! {
    pub struct SetHealth {
        pub health: f32,
        pub food: VarInt,
        pub saturation: f32,
    }
}

packet! {
    pub struct SetSubtitleText {
        pub text: Text,
    }
}

packet! {
    pub struct SetTime {
        pub game_time: i64,
        pub day_time: i64,
    }
}

packet! {
    pub struct SetTitleText {
        pub text: Text,
    }
}

packet! {
    pub struct SetTitlesAnimation {
        pub fade_in: i32,
        pub stay: i32,
        pub fade_out: i32,
    }
}

packet! {
    /// Sends the client back to configuration. It answers with
    /// `ConfigurationAcknowledged`.
    pub struct StartConfiguration {}
}

packet! {
    pub struct SystemChat {
        pub content: Text,
        pub overlay: bool,
    }
}

packet! {
    pub struct TabList {
        pub header: Text,
        pub footer: Text,
    }
}

packet! {
    pub struct TickingState {
        pub tick_rate: f32,
        pub frozen: bool,
    }
}

packet! {
    pub struct TickingStep {
        pub steps: VarInt,
    }
}

packet_set! {
    /// Packets the server sends during play.
    pub enum Clientbound / ClientboundKind (Clientbound, Play) {
        0x00 => BundleDelimiter(BundleDelimiter),
        0x0a => BossEvent(BossEvent),
        0x0b => ChangeDifficulty(ChangeDifficulty),
        0x0c => ChunkBatchFinished(ChunkBatchFinished),
        0x0d => ChunkBatchStart(ChunkBatchStart),
        0x0f => ClearTitles(ClearTitles),
        0x10 => CommandSuggestions(CommandSuggestions),
        0x11 => Commands(Commands),
        0x18 => CustomPayload(ClientboundCustomPayload),
        0x1b => Disconnect(Disconnect),
        0x20 => GameEvent(GameEvent),
        0x24 => KeepAlive(KeepAlive),
        0x29 => Login(Login),
        0x33 => Ping(Ping),
        0x34 => PongResponse(PongResponse),
        0x36 => PlayerAbilities(PlayerAbilities),
        0x3b => PlayerInfoRemove(PlayerInfoRemove),
        0x3c => PlayerInfoUpdate(PlayerInfoUpdate),
        0x3e => PlayerPosition(PlayerPosition),
        0x43 => ResourcePackPop(ResourcePackPop),
        0x44 => ResourcePackPush(ResourcePackPush),
        0x4a => SetActionBarText(SetActionBarText),
        0x52 => SetChunkCacheCenter(SetChunkCacheCenter),
        0x53 => SetChunkCacheRadius(SetChunkCacheRadius),
        0x54 => SetDefaultSpawnPosition(SetDefaultSpawnPosition),
        0x5b => SetHealth(SetHealth),
        0x61 => SetSubtitleText(SetSubtitleText),
        0x62 => SetTime(SetTime),
        0x63 => SetTitleText(SetTitleText),
        0x64 => SetTitlesAnimation(SetTitlesAnimation),
        0x67 => StartConfiguration(StartConfiguration),
        0x69 => SystemChat(SystemChat),
        0x6a => TabList(TabList),
        0x6e => TickingState(TickingState),
        0x6f => TickingStep(TickingStep),
    }
    inserted_in_766 {
        0x16 => CookieRequest(CookieRequest),
        0x1b => DebugSample(DebugSample),
        0x6b => StoreCookie(StoreCookie),
        0x73 => Transfer(Transfer),
    }
    bundle_delimiter = BundleDelimiter;
}

//! The tab-list update packet.
//!
//! A leading actions byte says which parts every entry carries. All
//! entries in one packet must carry the same parts, so the byte is
//! computed from the entries on encode and a disagreement is an error.

use uuid::Uuid;

use crate::codec::{Decode, Encode, Reader, VarInt, Writer};
use crate::error::{DecodeError, EncodeError};
use crate::text::Text;
use crate::types::{BoundedVec, ProfileProperty, read_string, write_string};

const ADD_PLAYER: u8 = 0x01;
const INITIALIZE_CHAT: u8 = 0x02;
const UPDATE_GAME_MODE: u8 = 0x04;
const UPDATE_LISTED: u8 = 0x08;
const UPDATE_LATENCY: u8 = 0x10;
const UPDATE_DISPLAY_NAME: u8 = 0x20;
const ALL_ACTIONS: u8 = 0x3f;

/// A player's chat signing session, as other clients see it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteChatSession {
    pub session_id: Uuid,
    pub expires_at: i64,
    pub public_key: BoundedVec<u8, 512>,
    pub key_signature: BoundedVec<u8, 4096>,
}

impl Encode for RemoteChatSession {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        self.session_id.encode(w)?;
        self.expires_at.encode(w)?;
        self.public_key.encode(w)?;
        self.key_signature.encode(w)
    }
}

impl Decode for RemoteChatSession {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            session_id: Uuid::decode(r)?,
            expires_at: i64::decode(r)?,
            public_key: Decode::decode(r)?,
            key_signature: Decode::decode(r)?,
        })
    }
}

/// The name and skin sent when a player first appears.
#[derive(Debug, Clone, PartialEq)]
pub struct AddPlayer {
    pub name: String,
    pub properties: Vec<ProfileProperty>,
}

/// One player's row. `None` means "this part is not being updated".
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInfoEntry {
    pub uuid: Uuid,
    pub add_player: Option<AddPlayer>,
    /// `Some(None)` clears the session.
    pub chat_session: Option<Option<RemoteChatSession>>,
    pub game_mode: Option<VarInt>,
    pub listed: Option<bool>,
    pub latency: Option<VarInt>,
    /// `Some(None)` resets to the profile name.
    pub display_name: Option<Option<Text>>,
}

impl PlayerInfoEntry {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            add_player: None,
            chat_session: None,
            game_mode: None,
            listed: None,
            latency: None,
            display_name: None,
        }
    }

    fn actions(&self) -> u8 {
        let mut actions = 0;
        if self.add_player.is_some() {
            actions |= ADD_PLAYER;
        }
        if self.chat_session.is_some() {
            actions |= INITIALIZE_CHAT;
        }
        if self.game_mode.is_some() {
            actions |= UPDATE_GAME_MODE;
        }
        if self.listed.is_some() {
            actions |= UPDATE_LISTED;
        }
        if self.latency.is_some() {
            actions |= UPDATE_LATENCY;
        }
        if self.display_name.is_some() {
            actions |= UPDATE_DISPLAY_NAME;
        }
        actions
    }

    fn encode_parts(&self, w: &mut Writer) -> Result<(), EncodeError> {
        self.uuid.encode(w)?;
        if let Some(add) = &self.add_player {
            write_string(w, &add.name, 16)?;
            add.properties.encode(w)?;
        }
        if let Some(session) = &self.chat_session {
            session.encode(w)?;
        }
        if let Some(game_mode) = self.game_mode {
            game_mode.encode(w)?;
        }
        if let Some(listed) = self.listed {
            listed.encode(w)?;
        }
        if let Some(latency) = self.latency {
            latency.encode(w)?;
        }
        if let Some(display_name) = &self.display_name {
            display_name.encode(w)?;
        }
        Ok(())
    }

    fn decode_parts(r: &mut Reader<'_>, actions: u8) -> Result<Self, DecodeError> {
        let has = |bit: u8| actions & bit != 0;
        let uuid = Uuid::decode(r)?;
        let add_player = if has(ADD_PLAYER) {
            Some(AddPlayer {
                name: read_string(r, 16)?,
                properties: Vec::decode(r)?,
            })
        } else {
            None
        };
        Ok(Self {
            uuid,
            add_player,
            chat_session: if has(INITIALIZE_CHAT) { Some(Decode::decode(r)?) } else { None },
            game_mode: if has(UPDATE_GAME_MODE) { Some(VarInt::decode(r)?) } else { None },
            listed: if has(UPDATE_LISTED) { Some(bool::decode(r)?) } else { None },
            latency: if has(UPDATE_LATENCY) { Some(VarInt::decode(r)?) } else { None },
            display_name: if has(UPDATE_DISPLAY_NAME) { Some(Decode::decode(r)?) } else { None },
        })
    }
}

/// Adds or updates rows of the tab list.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInfoUpdate {
    pub entries: Vec<PlayerInfoEntry>,
}

impl Encode for PlayerInfoUpdate {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        let actions = self.entries.first().map_or(0, PlayerInfoEntry::actions);
        if let Some(odd) = self.entries.iter().find(|e| e.actions() != actions) {
            return Err(EncodeError::InconsistentFlags {
                ty: "PlayerInfoUpdate",
                detail: format!(
                    "entry {} updates {:#04x}, first entry updates {actions:#04x}",
                    odd.uuid,
                    odd.actions()
                ),
            });
        }
        w.write_u8(actions);
        w.write_len(self.entries.len())?;
        for entry in &self.entries {
            entry.encode_parts(w)?;
        }
        Ok(())
    }
}

impl Decode for PlayerInfoUpdate {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let actions = r.read_u8()?;
        if actions & !ALL_ACTIONS != 0 {
            return Err(DecodeError::UnknownFlags {
                ty: "PlayerInfoUpdate",
                flags: u64::from(actions),
            });
        }
        let count = r.read_len()?;
        // Every entry is at least a UUID.
        if count.saturating_mul(16) > r.remaining() {
            return Err(DecodeError::UnexpectedEof {
                needed: count.saturating_mul(16) - r.remaining(),
            });
        }
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(PlayerInfoEntry::decode_parts(r, actions)?);
        }
        Ok(Self { entries })
    }
}

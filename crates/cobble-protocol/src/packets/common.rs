//! Shapes shared by the configuration and play stages.

use uuid::Uuid;

use crate::codec::{Decode, Encode, Reader, VarInt, Writer};
use crate::error::{DecodeError, EncodeError};
use crate::text::Text;
use crate::types::{
    BoundedString, BoundedVec, ClientboundPayload, Ident, ServerboundPayload, Str,
};

/// Most bytes a cookie may hold.
pub const MAX_COOKIE_BYTES: usize = 5120;

packet! {
    /// A plugin message from the client.
    pub struct ServerboundCustomPayload {
        pub channel: Ident,
        pub data: ServerboundPayload,
    }
}

packet! {
    /// A plugin message to the client.
    pub struct ClientboundCustomPayload {
        pub channel: Ident,
        pub data: ClientboundPayload,
    }
}

packet! {
    /// Liveness check. The client echoes the id back in its own `KeepAlive`.
    pub struct KeepAlive {
        pub id: i64,
    }
}

packet! {
    /// Server-initiated ping; the client answers with [`Pong`].
    pub struct Ping {
        pub id: i32,
    }
}

packet! {
    pub struct Pong {
        pub id: i32,
    }
}

packet! {
    /// Disconnect with a reason, as a tag-tree text component.
    pub struct Disconnect {
        pub reason: Text,
    }
}

packet! {
    /// Both directions: the sender is done configuring.
    pub struct FinishConfiguration {}
}

varint_enum! {
    pub enum ChatVisibility {
        Full = 0,
        SystemOnly = 1,
        Hidden = 2,
    }
}

varint_enum! {
    pub enum MainHand {
        Left = 0,
        Right = 1,
    }
}

varint_enum! {
    pub enum Hand {
        Main = 0,
        Off = 1,
    }
}

packet! {
    /// The client's settings. Sent in configuration and again in play
    /// whenever the player changes them.
    pub struct ClientInformation {
        pub locale: BoundedString<16>,
        pub view_distance: i8,
        pub chat_visibility: ChatVisibility,
        pub chat_colors: bool,
        pub displayed_skin_parts: u8,
        pub main_hand: MainHand,
        pub text_filtering: bool,
        pub allows_listing: bool,
    }
}

impl Default for ClientInformation {
    fn default() -> Self {
        Self {
            locale: BoundedString::from("en_us"),
            view_distance: 2,
            chat_visibility: ChatVisibility::Full,
            chat_colors: true,
            displayed_skin_parts: 0x7f,
            main_hand: MainHand::Right,
            text_filtering: false,
            allows_listing: true,
        }
    }
}

packet! {
    /// Asks the client to download and apply a resource pack.
    pub struct ResourcePackPush {
        pub id: Uuid,
        pub url: Str,
        pub hash: BoundedString<40>,
        pub required: bool,
        pub prompt: Option<Text>,
    }
}

packet! {
    /// Removes one pack, or all of them when `id` is absent.
    pub struct ResourcePackPop {
        pub id: Option<Uuid>,
    }
}

varint_enum! {
    /// Progress report for a pushed resource pack.
    pub enum ResourcePackAction {
        SuccessfullyLoaded = 0,
        Declined = 1,
        FailedDownload = 2,
        Accepted = 3,
        Downloaded = 4,
        InvalidUrl = 5,
        FailedReload = 6,
        Discarded = 7,
    }
}

impl ResourcePackAction {
    /// Whether this report ends the pack's lifecycle.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Accepted | Self::Downloaded)
    }

    /// Whether this report means the client will not have the pack.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::Declined
                | Self::FailedDownload
                | Self::InvalidUrl
                | Self::FailedReload
                | Self::Discarded
        )
    }
}

packet! {
    pub struct ResourcePackResponse {
        pub id: Uuid,
        pub action: ResourcePackAction,
    }
}

packet! {
    pub struct CookieRequest {
        pub key: Ident,
    }
}

packet! {
    /// The client's answer to a [`CookieRequest`]. An absent payload means
    /// the client has no cookie under that key.
    pub struct CookieResponse {
        pub key: Ident,
        pub payload: Option<BoundedVec<u8, MAX_COOKIE_BYTES>>,
    }
}

packet! {
    pub struct StoreCookie {
        pub key: Ident,
        pub payload: BoundedVec<u8, MAX_COOKIE_BYTES>,
    }
}

packet! {
    /// Tells the client to reconnect to another server.
    pub struct Transfer {
        pub host: Str,
        pub port: VarInt,
    }
}

packet! {
    pub struct UpdateEnabledFeatures {
        pub features: Vec<Ident>,
    }
}

packet! {
    pub struct TagEntry {
        pub name: Ident,
        pub entries: Vec<VarInt>,
    }
}

packet! {
    pub struct RegistryTags {
        pub registry: Ident,
        pub tags: Vec<TagEntry>,
    }
}

packet! {
    pub struct UpdateTags {
        pub registries: Vec<RegistryTags>,
    }
}

packet! {
    /// A data pack both sides may already have.
    pub struct KnownPack {
        pub namespace: Str,
        pub id: Str,
        pub version: Str,
    }
}

packet! {
    /// Both directions: the server lists the packs it uses, the client
    /// answers with the subset it has.
    pub struct SelectKnownPacks {
        pub packs: BoundedVec<KnownPack, 64>,
    }
}

packet! {
    pub struct ResetChat {}
}

packet! {
    pub struct RegistryEntry {
        pub id: Ident,
        pub data: Option<crate::nbt::Tag>,
    }
}

/// Registry contents pushed during configuration.
///
/// Protocol 765 sends every registry in one tag tree. Protocol 766 sends
/// one packet per registry, with entries the client may already know from
/// a shared pack left without data.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryData {
    Combined(crate::nbt::Tag),
    Single {
        registry: Ident,
        entries: Vec<RegistryEntry>,
    },
}

impl Encode for RegistryData {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        match (self, w.version().has_cookies()) {
            (Self::Combined(tag), false) => tag.encode(w),
            (Self::Single { registry, entries }, true) => {
                registry.encode(w)?;
                entries.encode(w)
            }
            (Self::Combined(_), true) | (Self::Single { .. }, false) => Err(EncodeError::OutOfRange {
                ty: "RegistryData",
                detail: format!("layout does not exist in protocol {}", w.version()),
            }),
        }
    }
}

impl Decode for RegistryData {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        if r.version().has_cookies() {
            Ok(Self::Single {
                registry: Ident::decode(r)?,
                entries: Vec::decode(r)?,
            })
        } else {
            Ok(Self::Combined(crate::nbt::Tag::decode(r)?))
        }
    }
}

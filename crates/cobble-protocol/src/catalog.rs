//! Per-version opcode catalogs.
//!
//! A [`Catalog`] maps opcodes to packet kinds (and back) for one
//! version, direction and stage. It is built once from the packet set's
//! layout constants: protocol 765 uses the base layout as written, and
//! protocol 766 applies its insertions on top, shifting every later
//! opcode up by one per insertion.
//!
//! All six catalogs of a version live in a [`Protocol`], and all
//! versions live in a [`ProtocolRegistry`]. The registry is immutable
//! after construction; servers build one and share it behind an `Arc`.

use std::collections::HashMap;
use std::fmt;

use crate::codec::{Decode, Encode, Reader, VarInt, Writer};
use crate::error::{DecodeError, EncodeError};
use crate::packets::{PacketSet, configuration, login, play};
use crate::version::{Direction, ProtocolVersion, Stage};

/// Opcode ↔ kind tables for one packet set in one version.
#[derive(Debug, Clone)]
pub struct Catalog<P: PacketSet> {
    version: ProtocolVersion,
    by_opcode: Vec<Option<P::Kind>>,
    by_kind: HashMap<P::Kind, i32>,
}

/// Computes the `(opcode, kind)` layout of `P` in `version`.
pub fn layout<P: PacketSet>(version: ProtocolVersion) -> Vec<(i32, P::Kind)> {
    let mut entries = P::BASE_LAYOUT.to_vec();
    if version >= ProtocolVersion::V766 {
        for &(at, kind) in P::V766_INSERTIONS {
            for entry in &mut entries {
                if entry.0 >= at {
                    entry.0 += 1;
                }
            }
            entries.push((at, kind));
        }
    }
    entries.sort_by_key(|&(opcode, _)| opcode);
    entries
}

impl<P: PacketSet> Catalog<P> {
    /// Builds the tables for `version`.
    ///
    /// # Panics
    /// Panics if the layout maps two kinds to one opcode or one kind to two
    /// opcodes. The layouts are static, so this can only be a programming
    /// error and is covered by tests.
    pub fn build(version: ProtocolVersion) -> Self {
        let entries = layout::<P>(version);
        let size = entries.last().map_or(0, |&(opcode, _)| opcode as usize + 1);
        let mut by_opcode = vec![None; size];
        let mut by_kind = HashMap::with_capacity(entries.len());
        for (opcode, kind) in entries {
            let slot = &mut by_opcode[opcode as usize];
            assert!(
                slot.is_none(),
                "opcode {opcode:#04x} assigned twice in {} {} catalog of protocol {version}",
                P::DIRECTION,
                P::STAGE,
            );
            *slot = Some(kind);
            let previous = by_kind.insert(kind, opcode);
            assert!(previous.is_none(), "{kind} assigned two opcodes in protocol {version}");
        }
        Self {
            version,
            by_opcode,
            by_kind,
        }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn direction(&self) -> Direction {
        P::DIRECTION
    }

    pub fn stage(&self) -> Stage {
        P::STAGE
    }

    /// Looks up the kind an opcode stands for.
    pub fn resolve(&self, opcode: i32) -> Result<P::Kind, DecodeError> {
        usize::try_from(opcode)
            .ok()
            .and_then(|index| self.by_opcode.get(index).copied().flatten())
            .ok_or(DecodeError::UnknownOpcode {
                version: self.version,
                direction: P::DIRECTION,
                stage: P::STAGE,
                opcode,
            })
    }

    /// Looks up the opcode of a kind.
    pub fn opcode_of(&self, kind: P::Kind) -> Result<i32, EncodeError> {
        self.by_kind
            .get(&kind)
            .copied()
            .ok_or_else(|| EncodeError::NotInCatalog {
                kind: kind.to_string(),
                version: self.version,
                direction: P::DIRECTION,
                stage: P::STAGE,
            })
    }

    pub fn contains(&self, kind: P::Kind) -> bool {
        self.by_kind.contains_key(&kind)
    }

    /// Every `(opcode, kind)` pair, in opcode order.
    pub fn entries(&self) -> impl Iterator<Item = (i32, P::Kind)> + '_ {
        self.by_opcode
            .iter()
            .enumerate()
            .filter_map(|(opcode, kind)| kind.map(|kind| (opcode as i32, kind)))
    }

    /// Decodes one frame: opcode, then a body that must fill the frame.
    pub fn decode(&self, frame: &[u8]) -> Result<P, DecodeError> {
        let mut r = Reader::new(frame, self.version);
        let VarInt(opcode) = VarInt::decode(&mut r)?;
        let kind = self.resolve(opcode)?;
        let packet = P::decode_kind(kind, &mut r)?;
        r.finish()?;
        Ok(packet)
    }

    /// Encodes one packet as a frame body: opcode, then fields.
    pub fn encode(&self, packet: &P) -> Result<Vec<u8>, EncodeError> {
        let opcode = self.opcode_of(packet.kind())?;
        let mut w = Writer::new(self.version);
        VarInt(opcode).encode(&mut w)?;
        packet.encode_body(&mut w)?;
        Ok(w.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

/// All catalogs of one protocol version.
#[derive(Debug, Clone)]
pub struct Protocol {
    version: ProtocolVersion,
    login_serverbound: Catalog<login::Serverbound>,
    login_clientbound: Catalog<login::Clientbound>,
    configuration_serverbound: Catalog<configuration::Serverbound>,
    configuration_clientbound: Catalog<configuration::Clientbound>,
    play_serverbound: Catalog<play::Serverbound>,
    play_clientbound: Catalog<play::Clientbound>,
}

/// Packet sets that have a catalog in every [`Protocol`].
pub trait Cataloged: PacketSet {
    fn select(protocol: &Protocol) -> &Catalog<Self>;
}

macro_rules! cataloged {
    ($($set:ty => $field:ident),* $(,)?) => {
        $(
            impl Cataloged for $set {
                fn select(protocol: &Protocol) -> &Catalog<Self> {
                    &protocol.$field
                }
            }
        )*
    };
}

cataloged! {
    login::Serverbound => login_serverbound,
    login::Clientbound => login_clientbound,
    configuration::Serverbound => configuration_serverbound,
    configuration::Clientbound => configuration_clientbound,
    play::Serverbound => play_serverbound,
    play::Clientbound => play_clientbound,
}

impl Protocol {
    pub fn build(version: ProtocolVersion) -> Self {
        Self {
            version,
            login_serverbound: Catalog::build(version),
            login_clientbound: Catalog::build(version),
            configuration_serverbound: Catalog::build(version),
            configuration_clientbound: Catalog::build(version),
            play_serverbound: Catalog::build(version),
            play_clientbound: Catalog::build(version),
        }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// The catalog for packet set `P`.
    pub fn catalog<P: Cataloged>(&self) -> &Catalog<P> {
        P::select(self)
    }

    pub fn decode<P: Cataloged>(&self, frame: &[u8]) -> Result<P, DecodeError> {
        self.catalog::<P>().decode(frame)
    }

    pub fn encode<P: Cataloged>(&self, packet: &P) -> Result<Vec<u8>, EncodeError> {
        self.catalog::<P>().encode(packet)
    }

    /// Resolves an opcode in any of this version's catalogs.
    pub fn resolve(
        &self,
        direction: Direction,
        stage: Stage,
        opcode: i32,
    ) -> Result<AnyKind, DecodeError> {
        Ok(match (direction, stage) {
            (Direction::Serverbound, Stage::Login) => {
                AnyKind::LoginServerbound(self.login_serverbound.resolve(opcode)?)
            }
            (Direction::Clientbound, Stage::Login) => {
                AnyKind::LoginClientbound(self.login_clientbound.resolve(opcode)?)
            }
            (Direction::Serverbound, Stage::Configuration) => {
                AnyKind::ConfigurationServerbound(self.configuration_serverbound.resolve(opcode)?)
            }
            (Direction::Clientbound, Stage::Configuration) => {
                AnyKind::ConfigurationClientbound(self.configuration_clientbound.resolve(opcode)?)
            }
            (Direction::Serverbound, Stage::Play) => {
                AnyKind::PlayServerbound(self.play_serverbound.resolve(opcode)?)
            }
            (Direction::Clientbound, Stage::Play) => {
                AnyKind::PlayClientbound(self.play_clientbound.resolve(opcode)?)
            }
        })
    }
}

/// A packet kind from any catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnyKind {
    LoginServerbound(login::ServerboundKind),
    LoginClientbound(login::ClientboundKind),
    ConfigurationServerbound(configuration::ServerboundKind),
    ConfigurationClientbound(configuration::ClientboundKind),
    PlayServerbound(play::ServerboundKind),
    PlayClientbound(play::ClientboundKind),
}

impl fmt::Display for AnyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoginServerbound(kind) => write!(f, "login/serverbound/{kind}"),
            Self::LoginClientbound(kind) => write!(f, "login/clientbound/{kind}"),
            Self::ConfigurationServerbound(kind) => write!(f, "configuration/serverbound/{kind}"),
            Self::ConfigurationClientbound(kind) => write!(f, "configuration/clientbound/{kind}"),
            Self::PlayServerbound(kind) => write!(f, "play/serverbound/{kind}"),
            Self::PlayClientbound(kind) => write!(f, "play/clientbound/{kind}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Every supported version's catalogs, built eagerly.
#[derive(Debug, Clone)]
pub struct ProtocolRegistry {
    protocols: Vec<Protocol>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self {
            protocols: ProtocolVersion::ALL.into_iter().map(Protocol::build).collect(),
        }
    }

    /// The catalogs for `version`.
    pub fn get(&self, version: ProtocolVersion) -> &Protocol {
        // Built from `ProtocolVersion::ALL`, which lists variants in
        // declaration order.
        &self.protocols[version as usize]
    }

    /// `resolve(version, direction, stage, opcode)`.
    pub fn resolve(
        &self,
        version: ProtocolVersion,
        direction: Direction,
        stage: Stage,
        opcode: i32,
    ) -> Result<AnyKind, DecodeError> {
        self.get(version).resolve(direction, stage, opcode)
    }
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! Wire protocol for Cobble.
//!
//! This crate is the language a client and the server speak once a
//! connection is framed:
//!
//! - **Codec** ([`Encode`], [`Decode`], [`Reader`], [`Writer`]): how
//!   primitive and composite values become bytes.
//! - **Shapes** ([`packets`]): every packet, per stage and direction.
//! - **Catalogs** ([`Catalog`], [`ProtocolRegistry`]): which opcode means
//!   which shape in which version.
//! - **Bundles** ([`bundle`]): grouping several clientbound packets.
//!
//! # Architecture
//!
//! ```text
//! Transport (frames) → Catalog (opcode → kind) → Shape (fields)
//! ```
//!
//! Nothing here knows about sockets, sessions or plugins.

mod codec;
mod error;
mod nbt;
mod text;
mod types;
mod version;

pub mod bundle;
pub mod catalog;
pub mod packets;

pub use bundle::{Assembled, BundleAssembler, MAX_BUNDLE_PACKETS, encode_bundle};
pub use catalog::{AnyKind, Catalog, Cataloged, Protocol, ProtocolRegistry};
pub use codec::{
    Decode, Encode, Reader, VarInt, VarLong, Writer, decode_counted, decode_exact, decode_prefix,
    encode_to_vec,
};
pub use error::{DecodeError, EncodeError, ProtocolError};
pub use nbt::{Compound, List, MAX_DEPTH, OptionalTag, Tag};
pub use packets::PacketSet;
pub use text::{JsonText, MAX_JSON_TEXT, Text};
pub use types::{
    Angle, BitSet, BlockPos, BoundedString, BoundedVec, ClientboundPayload, DEFAULT_MAX_STRING,
    FixedBitSet, GameProfile, Ident, MAX_PACKET_SIZE, ProfileProperty, RawBytes,
    ServerboundPayload, Str, TrailingBytes, read_discriminant, read_string, write_string,
};
pub use version::{Direction, ProtocolVersion, Stage};

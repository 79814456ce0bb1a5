//! Packet shapes, grouped by connection stage.
//!
//! Each stage module declares two packet sets (one per direction) with
//! [`packet_set!`]. A set is a closed enum of every shape that can travel
//! in that direction during that stage, plus a fieldless `…Kind` enum and
//! the opcode layout the catalog is built from.
//!
//! Most shapes are plain field sequences and are declared with
//! [`packet!`], which derives the codec from field order. Shapes whose
//! layout depends on the protocol version, on a tag or on a flags byte
//! implement [`Encode`](crate::codec::Encode) and
//! [`Decode`](crate::codec::Decode) by hand next to their definition.

use std::fmt::Debug;
use std::hash::Hash;

use crate::codec::{Reader, Writer};
use crate::error::{DecodeError, EncodeError};
use crate::version::{Direction, Stage};

/// Declares a struct whose wire form is its fields in declaration order.
macro_rules! packet {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $field: $ty,
            )*
        }

        impl $crate::codec::Encode for $name {
            #[allow(unused_variables)]
            fn encode(
                &self,
                w: &mut $crate::codec::Writer,
            ) -> ::std::result::Result<(), $crate::error::EncodeError> {
                $( $crate::codec::Encode::encode(&self.$field, w)?; )*
                Ok(())
            }
        }

        impl $crate::codec::Decode for $name {
            #[allow(unused_variables)]
            fn decode(
                r: &mut $crate::codec::Reader<'_>,
            ) -> ::std::result::Result<Self, $crate::error::DecodeError> {
                Ok(Self {
                    $( $field: $crate::codec::Decode::decode(r)?, )*
                })
            }
        }
    };
}

/// Declares a fieldless enum carried as a VarInt discriminant.
macro_rules! varint_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant, )*
        }

        impl $crate::codec::Encode for $name {
            fn encode(
                &self,
                w: &mut $crate::codec::Writer,
            ) -> ::std::result::Result<(), $crate::error::EncodeError> {
                let value = match self {
                    $( Self::$variant => $value, )*
                };
                $crate::codec::Encode::encode(&$crate::codec::VarInt(value), w)
            }
        }

        impl $crate::codec::Decode for $name {
            fn decode(
                r: &mut $crate::codec::Reader<'_>,
            ) -> ::std::result::Result<Self, $crate::error::DecodeError> {
                match <$crate::codec::VarInt as $crate::codec::Decode>::decode(r)?.0 {
                    $( $value => Ok(Self::$variant), )*
                    other => Err($crate::error::DecodeError::UnknownDiscriminant {
                        ty: stringify!($name),
                        value: i64::from(other),
                    }),
                }
            }
        }
    };
}

/// Declares a packet set: the packet enum, its kind enum, the exhaustive
/// decode and encode dispatch, and the opcode layout.
///
/// The first block lists the oldest version's layout. The `inserted_in_766`
/// block lists packets that protocol 766 inserts, each at its 766 opcode;
/// later packets shift up by one per insertion. A set that supports
/// bundles names its (fieldless) delimiter shape last.
macro_rules! packet_set {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident / $kind:ident ($dir:ident, $stage:ident) {
            $( $op:literal => $variant:ident($ty:ty), )*
        }
        inserted_in_766 {
            $( $op_new:literal => $variant_new:ident($ty_new:ty), )*
        }
        $( bundle_delimiter = $delim:ident; )?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        $vis enum $name {
            $( $variant($ty), )*
            $( $variant_new($ty_new), )*
        }

        #[doc = concat!("Which variant of [`", stringify!($name), "`] a packet is.")]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $kind {
            $( $variant, )*
            $( $variant_new, )*
        }

        impl $kind {
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => stringify!($variant), )*
                    $( Self::$variant_new => stringify!($variant_new), )*
                }
            }
        }

        impl ::std::fmt::Display for $kind {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.name())
            }
        }

        $(
            impl From<$ty> for $name {
                fn from(packet: $ty) -> Self {
                    Self::$variant(packet)
                }
            }
        )*
        $(
            impl From<$ty_new> for $name {
                fn from(packet: $ty_new) -> Self {
                    Self::$variant_new(packet)
                }
            }
        )*

        impl $crate::packets::PacketSet for $name {
            type Kind = $kind;

            const DIRECTION: $crate::version::Direction = $crate::version::Direction::$dir;
            const STAGE: $crate::version::Stage = $crate::version::Stage::$stage;
            const BASE_LAYOUT: &'static [(i32, $kind)] = &[ $( ($op, $kind::$variant), )* ];
            const V766_INSERTIONS: &'static [(i32, $kind)] =
                &[ $( ($op_new, $kind::$variant_new), )* ];

            fn kind(&self) -> $kind {
                match self {
                    $( Self::$variant(_) => $kind::$variant, )*
                    $( Self::$variant_new(_) => $kind::$variant_new, )*
                }
            }

            fn decode_kind(
                kind: $kind,
                r: &mut $crate::codec::Reader<'_>,
            ) -> ::std::result::Result<Self, $crate::error::DecodeError> {
                Ok(match kind {
                    $( $kind::$variant => Self::$variant($crate::codec::Decode::decode(r)?), )*
                    $( $kind::$variant_new => Self::$variant_new($crate::codec::Decode::decode(r)?), )*
                })
            }

            fn encode_body(
                &self,
                w: &mut $crate::codec::Writer,
            ) -> ::std::result::Result<(), $crate::error::EncodeError> {
                match self {
                    $( Self::$variant(p) => $crate::codec::Encode::encode(p, w), )*
                    $( Self::$variant_new(p) => $crate::codec::Encode::encode(p, w), )*
                }
            }

            $(
                fn bundle_delimiter() -> Option<Self> {
                    Some(Self::$delim($delim {}))
                }

                fn is_bundle_delimiter(&self) -> bool {
                    matches!(self, Self::$delim(_))
                }
            )?
        }
    };
}

pub mod common;
pub mod configuration;
pub mod handshake;
pub mod login;
pub mod play;

/// A closed set of packets for one direction and stage.
///
/// Implemented by [`packet_set!`]; the catalog builds its opcode tables
/// from the two layout constants.
pub trait PacketSet: Sized + Debug + Clone + Send + Sync + 'static {
    /// The fieldless discriminant of this set.
    type Kind: Copy + Eq + Hash + Debug + std::fmt::Display + Send + Sync + 'static;

    const DIRECTION: Direction;
    const STAGE: Stage;

    /// `(opcode, kind)` pairs for protocol 765.
    const BASE_LAYOUT: &'static [(i32, Self::Kind)];

    /// `(opcode, kind)` pairs protocol 766 inserts, in ascending order.
    const V766_INSERTIONS: &'static [(i32, Self::Kind)];

    fn kind(&self) -> Self::Kind;

    /// Decodes the body of a packet already resolved to `kind`.
    fn decode_kind(kind: Self::Kind, r: &mut Reader<'_>) -> Result<Self, DecodeError>;

    /// Encodes the body, without the opcode.
    fn encode_body(&self, w: &mut Writer) -> Result<(), EncodeError>;

    /// The marker that opens and closes a bundle, if this set has one.
    fn bundle_delimiter() -> Option<Self> {
        None
    }

    /// Whether `self` is the bundle marker.
    fn is_bundle_delimiter(&self) -> bool {
        false
    }
}

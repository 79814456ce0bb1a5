//! Composite wire types shared by many packets: bounded strings and
//! sequences, identifiers, packed positions, bit sets, and the trailing
//! raw-bytes tail.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::codec::{Decode, Encode, Reader, VarInt, Writer};
use crate::error::{DecodeError, EncodeError};

/// Upper bound on a single packet's body, in bytes.
pub const MAX_PACKET_SIZE: usize = 2_097_151;

/// Default character bound for strings that don't declare their own.
pub const DEFAULT_MAX_STRING: usize = 32_767;

// ---------------------------------------------------------------------------
// Bounded string
// ---------------------------------------------------------------------------

/// A UTF-8 string whose length is bounded in characters.
///
/// The prefix is the VarInt byte length of the UTF-8 data, which is what
/// clients write, not a character count. The bound is counted in
/// characters, so a string of `MAX` multi-byte characters is still
/// accepted while its prefix exceeds `MAX`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoundedString<const MAX: usize>(pub String);

impl<const MAX: usize> BoundedString<MAX> {
    pub const MAX_CHARS: usize = MAX;

    /// Wraps `value`, checking the bound up front.
    pub fn new(value: impl Into<String>) -> Result<Self, EncodeError> {
        let value = value.into();
        let len = value.chars().count();
        if len > MAX {
            return Err(EncodeError::StringTooLong { len, max: MAX });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<const MAX: usize> Encode for BoundedString<MAX> {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        write_string(w, &self.0, MAX)
    }
}

impl<const MAX: usize> Decode for BoundedString<MAX> {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        read_string(r, MAX).map(Self)
    }
}

impl<const MAX: usize> fmt::Display for BoundedString<MAX> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<const MAX: usize> From<&str> for BoundedString<MAX> {
    /// Unchecked; the bound is enforced when the value is encoded.
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl<const MAX: usize> From<String> for BoundedString<MAX> {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl<const MAX: usize> AsRef<str> for BoundedString<MAX> {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The common string bound.
pub type Str = BoundedString<DEFAULT_MAX_STRING>;

/// Writes a string with its byte-length prefix, enforcing `max` characters.
pub fn write_string(w: &mut Writer, value: &str, max: usize) -> Result<(), EncodeError> {
    let len = value.chars().count();
    if len > max {
        return Err(EncodeError::StringTooLong { len, max });
    }
    w.write_len(value.len())?;
    w.write_bytes(value.as_bytes());
    Ok(())
}

/// Reads a string, enforcing `max` characters.
pub fn read_string(r: &mut Reader<'_>, max: usize) -> Result<String, DecodeError> {
    let byte_len = r.read_len()?;
    // A character is at most four UTF-8 bytes.
    if byte_len > max.saturating_mul(4) {
        return Err(DecodeError::StringTooLong { len: byte_len, max });
    }
    let bytes = r.read_bytes(byte_len)?;
    let value = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
    let len = value.chars().count();
    if len > max {
        return Err(DecodeError::StringTooLong { len, max });
    }
    Ok(value.to_owned())
}

// ---------------------------------------------------------------------------
// Bounded sequence
// ---------------------------------------------------------------------------

/// A VarInt-counted sequence with a maximum element count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundedVec<T, const MAX: usize>(pub Vec<T>);

impl<T: Encode, const MAX: usize> Encode for BoundedVec<T, MAX> {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        if self.0.len() > MAX {
            return Err(EncodeError::SequenceTooLong {
                len: self.0.len(),
                max: MAX,
            });
        }
        self.0.encode(w)
    }
}

impl<T: Decode, const MAX: usize> Decode for BoundedVec<T, MAX> {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let count = r.read_len()?;
        if count > MAX {
            return Err(DecodeError::SequenceTooLong { len: count, max: MAX });
        }
        crate::codec::decode_counted(r, count).map(Self)
    }
}

impl<T, const MAX: usize> From<Vec<T>> for BoundedVec<T, MAX> {
    fn from(items: Vec<T>) -> Self {
        Self(items)
    }
}

// ---------------------------------------------------------------------------
// Trailing bytes
// ---------------------------------------------------------------------------

/// Everything left in the frame, with no length prefix.
///
/// Only valid as the last field of a packet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TrailingBytes<const MAX: usize>(pub Vec<u8>);

impl<const MAX: usize> TrailingBytes<MAX> {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl<const MAX: usize> Encode for TrailingBytes<MAX> {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        if self.0.len() > MAX {
            return Err(EncodeError::SequenceTooLong {
                len: self.0.len(),
                max: MAX,
            });
        }
        w.write_bytes(&self.0);
        Ok(())
    }
}

impl<const MAX: usize> Decode for TrailingBytes<MAX> {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let rest = r.read_rest();
        if rest.len() > MAX {
            return Err(DecodeError::SequenceTooLong {
                len: rest.len(),
                max: MAX,
            });
        }
        Ok(Self(rest.to_vec()))
    }
}

/// An uninterpreted tail, bounded only by the frame size.
pub type RawBytes = TrailingBytes<MAX_PACKET_SIZE>;

/// Plugin-message data sent by the client.
pub type ServerboundPayload = TrailingBytes<32_767>;

/// Plugin-message data sent by the server.
pub type ClientboundPayload = TrailingBytes<1_048_576>;

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// A namespaced identifier such as `minecraft:brand`.
///
/// A bare path parses with the `minecraft` namespace, so `brand` and
/// `minecraft:brand` are the same identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident {
    namespace: String,
    path: String,
}

impl Ident {
    pub const DEFAULT_NAMESPACE: &'static str = "minecraft";

    /// Builds an identifier from its two halves.
    pub fn new(namespace: &str, path: &str) -> Result<Self, DecodeError> {
        let valid_namespace = !namespace.is_empty()
            && namespace
                .bytes()
                .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b'.'));
        let valid_path = !path.is_empty()
            && path
                .bytes()
                .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b'.' | b'/'));
        if !valid_namespace || !valid_path {
            return Err(DecodeError::InvalidIdentifier(format!("{namespace}:{path}")));
        }
        Ok(Self {
            namespace: namespace.to_owned(),
            path: path.to_owned(),
        })
    }

    /// An identifier in the default namespace.
    pub fn vanilla(path: &str) -> Result<Self, DecodeError> {
        Self::new(Self::DEFAULT_NAMESPACE, path)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl FromStr for Ident {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((namespace, path)) => Self::new(namespace, path),
            None => Self::vanilla(s),
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

impl Encode for Ident {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        write_string(w, &self.to_string(), DEFAULT_MAX_STRING)
    }
}

impl Decode for Ident {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        read_string(r, DEFAULT_MAX_STRING)?.parse()
    }
}

// ---------------------------------------------------------------------------
// Angle and position
// ---------------------------------------------------------------------------

/// A rotation in 1/256ths of a full turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Angle(pub u8);

impl Angle {
    pub fn from_degrees(degrees: f32) -> Self {
        Angle((degrees.rem_euclid(360.0) / 360.0 * 256.0) as i32 as u8)
    }

    pub fn degrees(self) -> f32 {
        f32::from(self.0) * 360.0 / 256.0
    }
}

impl Encode for Angle {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_u8(self.0);
        Ok(())
    }
}

impl Decode for Angle {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        r.read_u8().map(Angle)
    }
}

/// A block coordinate packed into one 64-bit integer.
///
/// Layout, most significant bit first: 26 bits of x, 26 bits of z,
/// 12 bits of y.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    fn packed(self) -> Result<i64, EncodeError> {
        let horizontal = -(1 << 25)..(1 << 25);
        let vertical = -(1 << 11)..(1 << 11);
        if !horizontal.contains(&self.x) || !horizontal.contains(&self.z) || !vertical.contains(&self.y)
        {
            return Err(EncodeError::OutOfRange {
                ty: "BlockPos",
                detail: format!("({}, {}, {})", self.x, self.y, self.z),
            });
        }
        Ok(((i64::from(self.x) & 0x3ff_ffff) << 38)
            | ((i64::from(self.z) & 0x3ff_ffff) << 12)
            | (i64::from(self.y) & 0xfff))
    }

    fn unpacked(value: i64) -> Self {
        Self {
            x: (value >> 38) as i32,
            y: (value << 52 >> 52) as i32,
            z: (value << 26 >> 38) as i32,
        }
    }
}

impl Encode for BlockPos {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        self.packed()?.encode(w)
    }
}

impl Decode for BlockPos {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        i64::decode(r).map(Self::unpacked)
    }
}

// ---------------------------------------------------------------------------
// Bit sets
// ---------------------------------------------------------------------------

/// A bit set of statically known size, written as its raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedBitSet<const BYTES: usize>(pub [u8; BYTES]);

impl<const BYTES: usize> Default for FixedBitSet<BYTES> {
    fn default() -> Self {
        Self([0; BYTES])
    }
}

impl<const BYTES: usize> FixedBitSet<BYTES> {
    pub fn get(&self, bit: usize) -> bool {
        self.0
            .get(bit / 8)
            .is_some_and(|byte| byte & (1 << (bit % 8)) != 0)
    }

    pub fn set(&mut self, bit: usize, on: bool) {
        if let Some(byte) = self.0.get_mut(bit / 8) {
            if on {
                *byte |= 1 << (bit % 8);
            } else {
                *byte &= !(1 << (bit % 8));
            }
        }
    }
}

impl<const BYTES: usize> Encode for FixedBitSet<BYTES> {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_bytes(&self.0);
        Ok(())
    }
}

impl<const BYTES: usize> Decode for FixedBitSet<BYTES> {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        r.read_array().map(Self)
    }
}

/// A variable-size bit set: a VarInt word count followed by 64-bit words.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BitSet(pub Vec<i64>);

impl BitSet {
    pub fn get(&self, bit: usize) -> bool {
        self.0
            .get(bit / 64)
            .is_some_and(|word| (*word as u64) & (1 << (bit % 64)) != 0)
    }

    pub fn set(&mut self, bit: usize) {
        let word = bit / 64;
        if self.0.len() <= word {
            self.0.resize(word + 1, 0);
        }
        self.0[word] |= (1u64 << (bit % 64)) as i64;
    }
}

impl Encode for BitSet {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        self.0.encode(w)
    }
}

impl Decode for BitSet {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Vec::<i64>::decode(r).map(Self)
    }
}

// ---------------------------------------------------------------------------
// Game profile
// ---------------------------------------------------------------------------

/// A signed key/value attached to a profile, such as skin textures.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProfileProperty {
    pub name: String,
    pub value: String,
    pub signature: Option<String>,
}

impl Encode for ProfileProperty {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        write_string(w, &self.name, 64)?;
        write_string(w, &self.value, DEFAULT_MAX_STRING)?;
        match &self.signature {
            Some(signature) => {
                true.encode(w)?;
                write_string(w, signature, 1024)
            }
            None => false.encode(w),
        }
    }
}

impl Decode for ProfileProperty {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let name = read_string(r, 64)?;
        let value = read_string(r, DEFAULT_MAX_STRING)?;
        let signature = if bool::decode(r)? {
            Some(read_string(r, 1024)?)
        } else {
            None
        };
        Ok(Self {
            name,
            value,
            signature,
        })
    }
}

/// A player's identity as the login stage ends up knowing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GameProfile {
    pub uuid: Uuid,
    pub name: String,
    pub properties: Vec<ProfileProperty>,
}

impl GameProfile {
    pub const MAX_NAME: usize = 16;

    pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
            properties: Vec::new(),
        }
    }
}

impl Encode for GameProfile {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        self.uuid.encode(w)?;
        write_string(w, &self.name, Self::MAX_NAME)?;
        self.properties.encode(w)
    }
}

impl Decode for GameProfile {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            uuid: Uuid::decode(r)?,
            name: read_string(r, Self::MAX_NAME)?,
            properties: Vec::decode(r)?,
        })
    }
}

/// A VarInt-prefixed enum discriminant, for shapes that decode it by hand.
pub fn read_discriminant(r: &mut Reader<'_>) -> Result<i32, DecodeError> {
    VarInt::decode(r).map(|v| v.0)
}

//! The binary codec: a byte cursor, a writer, and the [`Encode`] /
//! [`Decode`] traits every wire shape implements.
//!
//! Shapes never see the transport. They read from a [`Reader`] over one
//! frame's bytes and write into a [`Writer`]. Both carry the negotiated
//! [`ProtocolVersion`] so a shape whose layout changed between versions
//! can branch on it without a second trait.
//!
//! All multi-byte numbers are big-endian.

use uuid::Uuid;

use crate::error::{DecodeError, EncodeError};
use crate::version::ProtocolVersion;

/// Serializes a value into a [`Writer`].
pub trait Encode {
    /// Appends the wire form of `self`.
    ///
    /// # Errors
    /// Returns [`EncodeError`] if a bounded field is over its limit or a
    /// value cannot be represented.
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError>;
}

/// Deserializes a value from a [`Reader`].
///
/// `Sized` because we return `Self` by value.
pub trait Decode: Sized {
    /// Reads one value, advancing the cursor past it.
    ///
    /// # Errors
    /// Returns [`DecodeError`] if the bytes are truncated or malformed.
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError>;
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// A forward-only cursor over a borrowed byte slice.
///
/// Reading past the end never panics: it returns
/// [`DecodeError::UnexpectedEof`] with the number of missing bytes.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    version: ProtocolVersion,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8], version: ProtocolVersion) -> Self {
        Self {
            buf,
            pos: 0,
            version,
        }
    }

    /// The protocol version the bytes were produced for.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or(DecodeError::UnexpectedEof { needed: 1 })?;
        self.pos += 1;
        Ok(byte)
    }

    /// Borrows the next `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining() {
            return Err(DecodeError::UnexpectedEof {
                needed: n - self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Borrows everything left in the frame.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    /// Shorthand for `T::decode(self)`.
    pub fn read<T: Decode>(&mut self) -> Result<T, DecodeError> {
        T::decode(self)
    }

    /// Reads a length or count prefix and rejects negative values.
    pub fn read_len(&mut self) -> Result<usize, DecodeError> {
        let VarInt(len) = VarInt::decode(self)?;
        usize::try_from(len).map_err(|_| DecodeError::NegativeLength(i64::from(len)))
    }

    /// Fails unless the cursor consumed the whole buffer.
    pub fn finish(&self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// An append-only output buffer.
#[derive(Debug, Clone)]
pub struct Writer {
    buf: Vec<u8>,
    version: ProtocolVersion,
}

impl Writer {
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            buf: Vec::new(),
            version,
        }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Shorthand for `value.encode(self)`.
    pub fn write<T: Encode + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        value.encode(self)
    }

    /// Writes a VarInt length prefix.
    pub fn write_len(&mut self, len: usize) -> Result<(), EncodeError> {
        let len = i32::try_from(len).map_err(|_| EncodeError::OutOfRange {
            ty: "length prefix",
            detail: format!("{len} does not fit in a VarInt"),
        })?;
        VarInt(len).encode(self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Encodes a single value into a fresh buffer.
pub fn encode_to_vec<T: Encode + ?Sized>(
    value: &T,
    version: ProtocolVersion,
) -> Result<Vec<u8>, EncodeError> {
    let mut w = Writer::new(version);
    value.encode(&mut w)?;
    Ok(w.into_inner())
}

/// Decodes one value from the front of `bytes`.
///
/// Returns the value and the number of bytes it occupied. Bytes after the
/// value are left alone, which is what a caller reading several values
/// back to back wants.
pub fn decode_prefix<T: Decode>(
    bytes: &[u8],
    version: ProtocolVersion,
) -> Result<(T, usize), DecodeError> {
    let mut r = Reader::new(bytes, version);
    let value = T::decode(&mut r)?;
    Ok((value, r.position()))
}

/// Decodes one value that must span all of `bytes`.
pub fn decode_exact<T: Decode>(bytes: &[u8], version: ProtocolVersion) -> Result<T, DecodeError> {
    let mut r = Reader::new(bytes, version);
    let value = T::decode(&mut r)?;
    r.finish()?;
    Ok(value)
}

// ---------------------------------------------------------------------------
// Fixed-width numbers
// ---------------------------------------------------------------------------

macro_rules! fixed_width {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Encode for $ty {
                fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
                    w.write_bytes(&self.to_be_bytes());
                    Ok(())
                }
            }

            impl Decode for $ty {
                fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
                    Ok(<$ty>::from_be_bytes(r.read_array()?))
                }
            }
        )*
    };
}

fixed_width!(i8, u8, i16, u16, i32, i64, u64, f32, f64);

impl Encode for bool {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_u8(u8::from(*self));
        Ok(())
    }
}

impl Decode for bool {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        match r.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::InvalidBool(other)),
        }
    }
}

impl Encode for Uuid {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_bytes(&self.as_u128().to_be_bytes());
        Ok(())
    }
}

impl Decode for Uuid {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Uuid::from_u128(u128::from_be_bytes(r.read_array()?)))
    }
}

// ---------------------------------------------------------------------------
// Variable-length integers
// ---------------------------------------------------------------------------

/// A 32-bit integer in 7-bit groups, least significant group first.
///
/// Negative values are written as their two's-complement `u32`, so they
/// always take the full five bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarInt(pub i32);

impl VarInt {
    /// 32 bits fit in at most five 7-bit groups.
    pub const MAX_BYTES: usize = 5;

    /// Number of bytes [`Encode::encode`] will write for this value.
    pub fn written_len(self) -> usize {
        let value = self.0 as u32;
        match value {
            0..=0x7f => 1,
            0x80..=0x3fff => 2,
            0x4000..=0x1f_ffff => 3,
            0x20_0000..=0x0fff_ffff => 4,
            _ => 5,
        }
    }
}

impl Encode for VarInt {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        let mut value = self.0 as u32;
        loop {
            if value & !0x7f == 0 {
                w.write_u8(value as u8);
                return Ok(());
            }
            w.write_u8((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
    }
}

impl Decode for VarInt {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let mut value: u32 = 0;
        for group in 0..Self::MAX_BYTES {
            let byte = r.read_u8()?;
            value |= u32::from(byte & 0x7f) << (7 * group);
            if byte & 0x80 == 0 {
                return Ok(VarInt(value as i32));
            }
        }
        Err(DecodeError::VarIntTooLong {
            max_bytes: Self::MAX_BYTES,
        })
    }
}

impl From<i32> for VarInt {
    fn from(value: i32) -> Self {
        VarInt(value)
    }
}

impl From<VarInt> for i32 {
    fn from(value: VarInt) -> Self {
        value.0
    }
}

/// A 64-bit integer in 7-bit groups. Same scheme as [`VarInt`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarLong(pub i64);

impl VarLong {
    pub const MAX_BYTES: usize = 10;
}

impl Encode for VarLong {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        let mut value = self.0 as u64;
        loop {
            if value & !0x7f == 0 {
                w.write_u8(value as u8);
                return Ok(());
            }
            w.write_u8((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
    }
}

impl Decode for VarLong {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let mut value: u64 = 0;
        for group in 0..Self::MAX_BYTES {
            let byte = r.read_u8()?;
            value |= u64::from(byte & 0x7f) << (7 * group);
            if byte & 0x80 == 0 {
                return Ok(VarLong(value as i64));
            }
        }
        Err(DecodeError::VarIntTooLong {
            max_bytes: Self::MAX_BYTES,
        })
    }
}

// ---------------------------------------------------------------------------
// Containers
// ---------------------------------------------------------------------------

/// Optional values carry a boolean presence prefix.
impl<T: Encode> Encode for Option<T> {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        match self {
            Some(value) => {
                w.write_u8(1);
                value.encode(w)
            }
            None => {
                w.write_u8(0);
                Ok(())
            }
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        if bool::decode(r)? {
            Ok(Some(T::decode(r)?))
        } else {
            Ok(None)
        }
    }
}

/// Unbounded sequences carry a VarInt count prefix.
///
/// The count is checked against the remaining input before anything is
/// allocated, so a forged prefix cannot reserve gigabytes.
impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_len(self.len())?;
        for item in self {
            item.encode(w)?;
        }
        Ok(())
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let count = r.read_len()?;
        decode_counted(r, count)
    }
}

/// Reads `count` elements with no prefix of their own.
pub fn decode_counted<T: Decode>(r: &mut Reader<'_>, count: usize) -> Result<Vec<T>, DecodeError> {
    if count > r.remaining() {
        return Err(DecodeError::UnexpectedEof {
            needed: count - r.remaining(),
        });
    }
    let mut items = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        items.push(T::decode(r)?);
    }
    Ok(items)
}

/// Fixed-size arrays have an externally known count and no prefix.
impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        for item in self {
            item.encode(w)?;
        }
        Ok(())
    }
}

impl<T: Decode, const N: usize> Decode for [T; N] {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let mut items = Vec::with_capacity(N);
        for _ in 0..N {
            items.push(T::decode(r)?);
        }
        items.try_into().map_err(|items: Vec<T>| DecodeError::CountMismatch {
            expected: N,
            actual: items.len(),
        })
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        (**self).encode(w)
    }
}

impl<T: Encode> Encode for Box<T> {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        (**self).encode(w)
    }
}

impl<T: Decode> Decode for Box<T> {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Box::new(T::decode(r)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V: ProtocolVersion = ProtocolVersion::V766;

    fn bytes_of<T: Encode>(value: &T) -> Vec<u8> {
        encode_to_vec(value, V).unwrap()
    }

    // =========================================================================
    // VarInt / VarLong
    // =========================================================================

    #[test]
    fn test_varint_boundary_encodings() {
        assert_eq!(bytes_of(&VarInt(0)), [0x00]);
        assert_eq!(bytes_of(&VarInt(127)), [0x7f]);
        assert_eq!(bytes_of(&VarInt(128)), [0x80, 0x01]);
        assert_eq!(bytes_of(&VarInt(255)), [0xff, 0x01]);
        assert_eq!(bytes_of(&VarInt(i32::MAX)), [0xff, 0xff, 0xff, 0xff, 0x07]);
        assert_eq!(bytes_of(&VarInt(-1)), [0xff, 0xff, 0xff, 0xff, 0x0f]);
        assert_eq!(bytes_of(&VarInt(i32::MIN)), [0x80, 0x80, 0x80, 0x80, 0x08]);
    }

    #[test]
    fn test_varint_decode_boundaries() {
        for value in [0, 1, 127, 128, 16_383, 16_384, i32::MAX, -1, i32::MIN] {
            let encoded = bytes_of(&VarInt(value));
            assert_eq!(encoded.len(), VarInt(value).written_len());
            let (decoded, used) = decode_prefix::<VarInt>(&encoded, V).unwrap();
            assert_eq!(decoded, VarInt(value));
            assert_eq!(used, encoded.len());
        }
    }

    #[test]
    fn test_varint_sixth_group_is_overflow() {
        let err = decode_exact::<VarInt>(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x00], V).unwrap_err();
        assert_eq!(err, DecodeError::VarIntTooLong { max_bytes: 5 });
    }

    #[test]
    fn test_varint_overflow_independent_of_value() {
        // Six groups encoding zero are still too many.
        let err = decode_prefix::<VarInt>(&[0x80; 6], V).unwrap_err();
        assert!(matches!(err, DecodeError::VarIntTooLong { .. }));
    }

    #[test]
    fn test_varint_truncated_is_eof() {
        let err = decode_exact::<VarInt>(&[0x80, 0x80], V).unwrap_err();
        assert_eq!(err, DecodeError::UnexpectedEof { needed: 1 });
    }

    #[test]
    fn test_varlong_boundaries() {
        for value in [0i64, 127, 128, i64::MAX, -1, i64::MIN] {
            let encoded = bytes_of(&VarLong(value));
            assert!(encoded.len() <= VarLong::MAX_BYTES);
            assert_eq!(decode_exact::<VarLong>(&encoded, V).unwrap(), VarLong(value));
        }
        assert_eq!(bytes_of(&VarLong(-1)).len(), 10);
        let err = decode_exact::<VarLong>(&[0x80; 11], V).unwrap_err();
        assert_eq!(err, DecodeError::VarIntTooLong { max_bytes: 10 });
    }

    // =========================================================================
    // Primitives and containers
    // =========================================================================

    #[test]
    fn test_numbers_are_big_endian() {
        assert_eq!(bytes_of(&0x0102_i16), [0x01, 0x02]);
        assert_eq!(bytes_of(&1.0_f32), [0x3f, 0x80, 0x00, 0x00]);
        assert_eq!(bytes_of(&-2_i64), [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe]);
    }

    #[test]
    fn test_bool_rejects_other_bytes() {
        assert!(decode_exact::<bool>(&[1], V).unwrap());
        assert_eq!(decode_exact::<bool>(&[2], V).unwrap_err(), DecodeError::InvalidBool(2));
    }

    #[test]
    fn test_uuid_is_two_big_endian_longs() {
        let id = Uuid::from_u128(0x0011_2233_4455_6677_8899_aabb_ccdd_eeff);
        let encoded = bytes_of(&id);
        assert_eq!(encoded[0], 0x00);
        assert_eq!(encoded[15], 0xff);
        assert_eq!(decode_exact::<Uuid>(&encoded, V).unwrap(), id);
    }

    #[test]
    fn test_option_presence_prefix() {
        assert_eq!(bytes_of(&Some(7u8)), [1, 7]);
        assert_eq!(bytes_of(&None::<u8>), [0]);
    }

    #[test]
    fn test_vec_count_larger_than_input_fails_fast() {
        // Claims 1000 elements, carries 2 bytes.
        let err = decode_exact::<Vec<u8>>(&[0xe8, 0x07, 1, 2], V).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_vec_negative_count_rejected() {
        let err = decode_exact::<Vec<u8>>(&[0xff, 0xff, 0xff, 0xff, 0x0f], V).unwrap_err();
        assert_eq!(err, DecodeError::NegativeLength(-1));
    }

    #[test]
    fn test_fixed_array_has_no_prefix() {
        let value = [1u16, 2, 3];
        assert_eq!(bytes_of(&value), [0, 1, 0, 2, 0, 3]);
        assert_eq!(decode_exact::<[u16; 3]>(&[0, 1, 0, 2, 0, 3], V).unwrap(), value);
    }

    #[test]
    fn test_decode_exact_rejects_trailing_bytes() {
        let err = decode_exact::<u8>(&[1, 2], V).unwrap_err();
        assert_eq!(err, DecodeError::TrailingBytes(1));
    }

    #[test]
    fn test_decode_prefix_reports_consumed() {
        let (value, used) = decode_prefix::<u16>(&[0, 5, 9, 9], V).unwrap();
        assert_eq!(value, 5);
        assert_eq!(used, 2);
    }
}

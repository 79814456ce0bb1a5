//! Network tag trees (NBT).
//!
//! On the wire a tree is a one-byte tag type followed by the payload,
//! with no root name. Registry data, text components in later stages and
//! a few item fields use this form.
//!
//! Decoding is bounded: nesting deeper than [`MAX_DEPTH`] is rejected,
//! and list/array counts are checked against the remaining input before
//! allocating.

use crate::codec::{Decode, Encode, Reader, Writer};
use crate::error::{DecodeError, EncodeError};

/// Maximum nesting of lists and compounds.
pub const MAX_DEPTH: usize = 512;

const END: u8 = 0;
const BYTE: u8 = 1;
const SHORT: u8 = 2;
const INT: u8 = 3;
const LONG: u8 = 4;
const FLOAT: u8 = 5;
const DOUBLE: u8 = 6;
const BYTE_ARRAY: u8 = 7;
const STRING: u8 = 8;
const LIST: u8 = 9;
const COMPOUND: u8 = 10;
const INT_ARRAY: u8 = 11;
const LONG_ARRAY: u8 = 12;

/// One node of a tag tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<i8>),
    String(String),
    List(List),
    Compound(Compound),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

/// A homogeneous list of tags.
///
/// The element type is stored explicitly so an empty list keeps the type
/// it was decoded with.
#[derive(Debug, Clone, PartialEq)]
pub struct List {
    element_type: u8,
    items: Vec<Tag>,
}

/// An ordered string-keyed map of tags.
///
/// Keys keep insertion order, so a decoded compound re-encodes to the
/// same bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Compound(Vec<(String, Tag)>);

impl Tag {
    fn type_id(&self) -> u8 {
        match self {
            Tag::Byte(_) => BYTE,
            Tag::Short(_) => SHORT,
            Tag::Int(_) => INT,
            Tag::Long(_) => LONG,
            Tag::Float(_) => FLOAT,
            Tag::Double(_) => DOUBLE,
            Tag::ByteArray(_) => BYTE_ARRAY,
            Tag::String(_) => STRING,
            Tag::List(_) => LIST,
            Tag::Compound(_) => COMPOUND,
            Tag::IntArray(_) => INT_ARRAY,
            Tag::LongArray(_) => LONG_ARRAY,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Tag::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&Compound> {
        match self {
            Tag::Compound(c) => Some(c),
            _ => None,
        }
    }

    fn encode_payload(&self, w: &mut Writer) -> Result<(), EncodeError> {
        match self {
            Tag::Byte(v) => v.encode(w),
            Tag::Short(v) => v.encode(w),
            Tag::Int(v) => v.encode(w),
            Tag::Long(v) => v.encode(w),
            Tag::Float(v) => v.encode(w),
            Tag::Double(v) => v.encode(w),
            Tag::ByteArray(v) => {
                write_array_len(w, v.len())?;
                v.iter().try_for_each(|b| b.encode(w))
            }
            Tag::String(s) => write_nbt_string(w, s),
            Tag::List(list) => list.encode_payload(w),
            Tag::Compound(compound) => compound.encode_payload(w),
            Tag::IntArray(v) => {
                write_array_len(w, v.len())?;
                v.iter().try_for_each(|i| i.encode(w))
            }
            Tag::LongArray(v) => {
                write_array_len(w, v.len())?;
                v.iter().try_for_each(|l| l.encode(w))
            }
        }
    }

    fn decode_payload(r: &mut Reader<'_>, type_id: u8, depth: usize) -> Result<Self, DecodeError> {
        Ok(match type_id {
            BYTE => Tag::Byte(i8::decode(r)?),
            SHORT => Tag::Short(i16::decode(r)?),
            INT => Tag::Int(i32::decode(r)?),
            LONG => Tag::Long(i64::decode(r)?),
            FLOAT => Tag::Float(f32::decode(r)?),
            DOUBLE => Tag::Double(f64::decode(r)?),
            BYTE_ARRAY => {
                let len = read_array_len(r, 1)?;
                Tag::ByteArray(crate::codec::decode_counted(r, len)?)
            }
            STRING => Tag::String(read_nbt_string(r)?),
            LIST => Tag::List(List::decode_payload(r, depth)?),
            COMPOUND => Tag::Compound(Compound::decode_payload(r, depth)?),
            INT_ARRAY => {
                let len = read_array_len(r, 4)?;
                Tag::IntArray(crate::codec::decode_counted(r, len)?)
            }
            LONG_ARRAY => {
                let len = read_array_len(r, 8)?;
                Tag::LongArray(crate::codec::decode_counted(r, len)?)
            }
            other => return Err(DecodeError::InvalidTagType(other)),
        })
    }
}

impl From<&str> for Tag {
    fn from(value: &str) -> Self {
        Tag::String(value.to_owned())
    }
}

impl From<String> for Tag {
    fn from(value: String) -> Self {
        Tag::String(value)
    }
}

impl From<Compound> for Tag {
    fn from(value: Compound) -> Self {
        Tag::Compound(value)
    }
}

impl From<List> for Tag {
    fn from(value: List) -> Self {
        Tag::List(value)
    }
}

impl From<bool> for Tag {
    fn from(value: bool) -> Self {
        Tag::Byte(i8::from(value))
    }
}

impl From<i32> for Tag {
    fn from(value: i32) -> Self {
        Tag::Int(value)
    }
}

impl List {
    /// An empty list with no element type.
    pub fn empty() -> Self {
        Self {
            element_type: END,
            items: Vec::new(),
        }
    }

    /// Builds a list, rejecting mixed element types.
    pub fn new(items: Vec<Tag>) -> Result<Self, EncodeError> {
        let element_type = items.first().map_or(END, Tag::type_id);
        if let Some(odd) = items.iter().find(|t| t.type_id() != element_type) {
            return Err(EncodeError::OutOfRange {
                ty: "nbt list",
                detail: format!(
                    "element of type {} in a list of type {element_type}",
                    odd.type_id()
                ),
            });
        }
        Ok(Self {
            element_type,
            items,
        })
    }

    pub fn items(&self) -> &[Tag] {
        &self.items
    }

    fn encode_payload(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_u8(self.element_type);
        write_array_len(w, self.items.len())?;
        for item in &self.items {
            if item.type_id() != self.element_type {
                return Err(EncodeError::OutOfRange {
                    ty: "nbt list",
                    detail: "mixed element types".to_owned(),
                });
            }
            item.encode_payload(w)?;
        }
        Ok(())
    }

    fn decode_payload(r: &mut Reader<'_>, depth: usize) -> Result<Self, DecodeError> {
        let depth = enter(depth)?;
        let element_type = r.read_u8()?;
        let len = read_array_len(r, 1)?;
        if element_type == END && len > 0 {
            return Err(DecodeError::InvalidTagType(END));
        }
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(Tag::decode_payload(r, element_type, depth)?);
        }
        Ok(Self {
            element_type,
            items,
        })
    }
}

impl Compound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, replacing an existing value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Tag>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Tag>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Tag> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tag)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn encode_payload(&self, w: &mut Writer) -> Result<(), EncodeError> {
        for (key, value) in &self.0 {
            w.write_u8(value.type_id());
            write_nbt_string(w, key)?;
            value.encode_payload(w)?;
        }
        w.write_u8(END);
        Ok(())
    }

    fn decode_payload(r: &mut Reader<'_>, depth: usize) -> Result<Self, DecodeError> {
        let depth = enter(depth)?;
        let mut entries = Vec::new();
        loop {
            let type_id = r.read_u8()?;
            if type_id == END {
                return Ok(Self(entries));
            }
            let key = read_nbt_string(r)?;
            let value = Tag::decode_payload(r, type_id, depth)?;
            entries.push((key, value));
        }
    }
}

fn enter(depth: usize) -> Result<usize, DecodeError> {
    let depth = depth + 1;
    if depth > MAX_DEPTH {
        return Err(DecodeError::TagTooDeep(MAX_DEPTH));
    }
    Ok(depth)
}

fn write_array_len(w: &mut Writer, len: usize) -> Result<(), EncodeError> {
    let len = i32::try_from(len).map_err(|_| EncodeError::OutOfRange {
        ty: "nbt array",
        detail: format!("{len} elements"),
    })?;
    len.encode(w)
}

fn read_array_len(r: &mut Reader<'_>, element_size: usize) -> Result<usize, DecodeError> {
    let len = i32::decode(r)?;
    let len = usize::try_from(len).map_err(|_| DecodeError::NegativeLength(i64::from(len)))?;
    let needed = len.saturating_mul(element_size);
    if needed > r.remaining() {
        return Err(DecodeError::UnexpectedEof {
            needed: needed - r.remaining(),
        });
    }
    Ok(len)
}

fn write_nbt_string(w: &mut Writer, value: &str) -> Result<(), EncodeError> {
    let len = u16::try_from(value.len()).map_err(|_| EncodeError::StringTooLong {
        len: value.len(),
        max: usize::from(u16::MAX),
    })?;
    len.encode(w)?;
    w.write_bytes(value.as_bytes());
    Ok(())
}

fn read_nbt_string(r: &mut Reader<'_>) -> Result<String, DecodeError> {
    let len = u16::decode(r)?;
    let bytes = r.read_bytes(usize::from(len))?;
    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
}

/// A root tag: type byte, then payload. `End` is not a valid root here.
impl Encode for Tag {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_u8(self.type_id());
        self.encode_payload(w)
    }
}

impl Decode for Tag {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let type_id = r.read_u8()?;
        Tag::decode_payload(r, type_id, 0)
    }
}

/// A root tag that may be absent, written as a lone `End` byte.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionalTag(pub Option<Tag>);

impl Encode for OptionalTag {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        match &self.0 {
            Some(tag) => tag.encode(w),
            None => {
                w.write_u8(END);
                Ok(())
            }
        }
    }
}

impl Decode for OptionalTag {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        match r.read_u8()? {
            END => Ok(Self(None)),
            type_id => Tag::decode_payload(r, type_id, 0).map(|t| Self(Some(t))),
        }
    }
}

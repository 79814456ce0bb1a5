//! The command tree sent to the client for tab completion and syntax
//! highlighting.
//!
//! Each node's flags byte says which optional parts follow, so the shape
//! is decoded by hand. Unknown flag bits are rejected rather than
//! skipped: a bit we don't understand means a field we can't find the
//! end of.

use crate::codec::{Decode, Encode, Reader, VarInt, Writer};
use crate::error::{DecodeError, EncodeError};
use crate::types::{Ident, Str, read_discriminant, read_string, write_string};
use crate::version::ProtocolVersion;

const TYPE_MASK: u8 = 0x03;
const TYPE_ROOT: u8 = 0x00;
const TYPE_LITERAL: u8 = 0x01;
const TYPE_ARGUMENT: u8 = 0x02;
const EXECUTABLE: u8 = 0x04;
const HAS_REDIRECT: u8 = 0x08;
const HAS_SUGGESTIONS: u8 = 0x10;
const KNOWN_FLAGS: u8 = TYPE_MASK | EXECUTABLE | HAS_REDIRECT | HAS_SUGGESTIONS;

/// How a string argument is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringKind {
    SingleWord,
    QuotablePhrase,
    GreedyPhrase,
}

/// An argument parser and its properties.
///
/// Parsers without properties are carried by registry id only.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentParser {
    Bool,
    Float { min: Option<f32>, max: Option<f32> },
    Double { min: Option<f64>, max: Option<f64> },
    Integer { min: Option<i32>, max: Option<i32> },
    Long { min: Option<i64>, max: Option<i64> },
    String(StringKind),
    /// Flags: `0x01` single target, `0x02` players only.
    Entity { flags: u8 },
    /// Flags: `0x01` allows multiple holders.
    ScoreHolder { flags: u8 },
    Time { min: i32 },
    ResourceOrTag { registry: Ident },
    ResourceOrTagKey { registry: Ident },
    Resource { registry: Ident },
    ResourceKey { registry: Ident },
    /// Any parser with no properties, by registry id.
    Other(i32),
}

const BOOL: i32 = 0;
const FLOAT: i32 = 1;
const DOUBLE: i32 = 2;
const INTEGER: i32 = 3;
const LONG: i32 = 4;
const STRING: i32 = 5;
const ENTITY: i32 = 6;
const SCORE_HOLDER: i32 = 30;

/// Ids from `item_slot` upward moved by one when 766 added `item_slots`.
fn time_id(version: ProtocolVersion) -> i32 {
    match version {
        ProtocolVersion::V765 => 41,
        ProtocolVersion::V766 => 42,
    }
}

const MIN_PRESENT: u8 = 0x01;
const MAX_PRESENT: u8 = 0x02;

fn encode_bounds<T: Encode>(w: &mut Writer, min: &Option<T>, max: &Option<T>) -> Result<(), EncodeError> {
    let mut flags = 0;
    if min.is_some() {
        flags |= MIN_PRESENT;
    }
    if max.is_some() {
        flags |= MAX_PRESENT;
    }
    w.write_u8(flags);
    if let Some(min) = min {
        min.encode(w)?;
    }
    if let Some(max) = max {
        max.encode(w)?;
    }
    Ok(())
}

fn decode_bounds<T: Decode>(r: &mut Reader<'_>) -> Result<(Option<T>, Option<T>), DecodeError> {
    let flags = r.read_u8()?;
    if flags & !(MIN_PRESENT | MAX_PRESENT) != 0 {
        return Err(DecodeError::UnknownFlags {
            ty: "numeric argument bounds",
            flags: u64::from(flags),
        });
    }
    let min = if flags & MIN_PRESENT != 0 { Some(T::decode(r)?) } else { None };
    let max = if flags & MAX_PRESENT != 0 { Some(T::decode(r)?) } else { None };
    Ok((min, max))
}

impl ArgumentParser {
    fn id(&self, version: ProtocolVersion) -> i32 {
        let resource_base = time_id(version) + 1;
        match self {
            Self::Bool => BOOL,
            Self::Float { .. } => FLOAT,
            Self::Double { .. } => DOUBLE,
            Self::Integer { .. } => INTEGER,
            Self::Long { .. } => LONG,
            Self::String(_) => STRING,
            Self::Entity { .. } => ENTITY,
            Self::ScoreHolder { .. } => SCORE_HOLDER,
            Self::Time { .. } => time_id(version),
            Self::ResourceOrTag { .. } => resource_base,
            Self::ResourceOrTagKey { .. } => resource_base + 1,
            Self::Resource { .. } => resource_base + 2,
            Self::ResourceKey { .. } => resource_base + 3,
            Self::Other(id) => *id,
        }
    }
}

impl Encode for ArgumentParser {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        VarInt(self.id(w.version())).encode(w)?;
        match self {
            Self::Bool | Self::Other(_) => Ok(()),
            Self::Float { min, max } => encode_bounds(w, min, max),
            Self::Double { min, max } => encode_bounds(w, min, max),
            Self::Integer { min, max } => encode_bounds(w, min, max),
            Self::Long { min, max } => encode_bounds(w, min, max),
            Self::String(kind) => VarInt(match kind {
                StringKind::SingleWord => 0,
                StringKind::QuotablePhrase => 1,
                StringKind::GreedyPhrase => 2,
            })
            .encode(w),
            Self::Entity { flags } | Self::ScoreHolder { flags } => flags.encode(w),
            Self::Time { min } => min.encode(w),
            Self::ResourceOrTag { registry }
            | Self::ResourceOrTagKey { registry }
            | Self::Resource { registry }
            | Self::ResourceKey { registry } => registry.encode(w),
        }
    }
}

impl Decode for ArgumentParser {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let id = read_discriminant(r)?;
        let time = time_id(r.version());
        let resource_base = time + 1;
        Ok(match id {
            BOOL => Self::Bool,
            FLOAT => {
                let (min, max) = decode_bounds(r)?;
                Self::Float { min, max }
            }
            DOUBLE => {
                let (min, max) = decode_bounds(r)?;
                Self::Double { min, max }
            }
            INTEGER => {
                let (min, max) = decode_bounds(r)?;
                Self::Integer { min, max }
            }
            LONG => {
                let (min, max) = decode_bounds(r)?;
                Self::Long { min, max }
            }
            STRING => Self::String(match read_discriminant(r)? {
                0 => StringKind::SingleWord,
                1 => StringKind::QuotablePhrase,
                2 => StringKind::GreedyPhrase,
                other => {
                    return Err(DecodeError::UnknownDiscriminant {
                        ty: "StringKind",
                        value: i64::from(other),
                    });
                }
            }),
            ENTITY => Self::Entity { flags: r.read_u8()? },
            SCORE_HOLDER => Self::ScoreHolder { flags: r.read_u8()? },
            id if id == time => Self::Time { min: i32::decode(r)? },
            id if id == resource_base => Self::ResourceOrTag { registry: Ident::decode(r)? },
            id if id == resource_base + 1 => Self::ResourceOrTagKey { registry: Ident::decode(r)? },
            id if id == resource_base + 2 => Self::Resource { registry: Ident::decode(r)? },
            id if id == resource_base + 3 => Self::ResourceKey { registry: Ident::decode(r)? },
            id if id < 0 => {
                return Err(DecodeError::UnknownDiscriminant {
                    ty: "ArgumentParser",
                    value: i64::from(id),
                });
            }
            id => Self::Other(id),
        })
    }
}

/// What a node matches.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    Literal { name: String },
    Argument { name: String, parser: ArgumentParser },
}

/// One node of the command graph. Children and redirects are indices
/// into [`Commands::nodes`].
#[derive(Debug, Clone, PartialEq)]
pub struct CommandNode {
    pub kind: NodeKind,
    pub executable: bool,
    pub children: Vec<VarInt>,
    pub redirect: Option<VarInt>,
    /// Only argument nodes may ask the server for suggestions.
    pub suggestions: Option<Ident>,
}

impl CommandNode {
    pub fn root(children: Vec<VarInt>) -> Self {
        Self {
            kind: NodeKind::Root,
            executable: false,
            children,
            redirect: None,
            suggestions: None,
        }
    }

    pub fn literal(name: impl Into<String>, executable: bool, children: Vec<VarInt>) -> Self {
        Self {
            kind: NodeKind::Literal { name: name.into() },
            executable,
            children,
            redirect: None,
            suggestions: None,
        }
    }

    pub fn argument(
        name: impl Into<String>,
        parser: ArgumentParser,
        executable: bool,
        suggestions: Option<Ident>,
    ) -> Self {
        Self {
            kind: NodeKind::Argument {
                name: name.into(),
                parser,
            },
            executable,
            children: Vec::new(),
            redirect: None,
            suggestions,
        }
    }

    fn flags(&self) -> Result<u8, EncodeError> {
        let mut flags = match self.kind {
            NodeKind::Root => TYPE_ROOT,
            NodeKind::Literal { .. } => TYPE_LITERAL,
            NodeKind::Argument { .. } => TYPE_ARGUMENT,
        };
        if self.executable {
            flags |= EXECUTABLE;
        }
        if self.redirect.is_some() {
            flags |= HAS_REDIRECT;
        }
        if self.suggestions.is_some() {
            if !matches!(self.kind, NodeKind::Argument { .. }) {
                return Err(EncodeError::InconsistentFlags {
                    ty: "CommandNode",
                    detail: "only argument nodes carry a suggestions type".to_owned(),
                });
            }
            flags |= HAS_SUGGESTIONS;
        }
        Ok(flags)
    }
}

impl Encode for CommandNode {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_u8(self.flags()?);
        self.children.encode(w)?;
        if let Some(redirect) = self.redirect {
            redirect.encode(w)?;
        }
        match &self.kind {
            NodeKind::Root => {}
            NodeKind::Literal { name } => write_string(w, name, Str::MAX_CHARS)?,
            NodeKind::Argument { name, parser } => {
                write_string(w, name, Str::MAX_CHARS)?;
                parser.encode(w)?;
            }
        }
        if let Some(suggestions) = &self.suggestions {
            suggestions.encode(w)?;
        }
        Ok(())
    }
}

impl Decode for CommandNode {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let flags = r.read_u8()?;
        if flags & !KNOWN_FLAGS != 0 {
            return Err(DecodeError::UnknownFlags {
                ty: "CommandNode",
                flags: u64::from(flags),
            });
        }
        let node_type = flags & TYPE_MASK;
        if node_type != TYPE_ARGUMENT && flags & HAS_SUGGESTIONS != 0 {
            return Err(DecodeError::UnknownFlags {
                ty: "CommandNode",
                flags: u64::from(flags),
            });
        }
        let children = Vec::decode(r)?;
        let redirect = if flags & HAS_REDIRECT != 0 {
            Some(VarInt::decode(r)?)
        } else {
            None
        };
        let kind = match node_type {
            TYPE_ROOT => NodeKind::Root,
            TYPE_LITERAL => NodeKind::Literal {
                name: read_string(r, Str::MAX_CHARS)?,
            },
            TYPE_ARGUMENT => NodeKind::Argument {
                name: read_string(r, Str::MAX_CHARS)?,
                parser: ArgumentParser::decode(r)?,
            },
            other => {
                return Err(DecodeError::UnknownDiscriminant {
                    ty: "command node type",
                    value: i64::from(other),
                });
            }
        };
        let suggestions = if flags & HAS_SUGGESTIONS != 0 {
            Some(Ident::decode(r)?)
        } else {
            None
        };
        Ok(Self {
            kind,
            executable: flags & EXECUTABLE != 0,
            children,
            redirect,
            suggestions,
        })
    }
}

packet! {
    /// The full command graph and the index of its root.
    pub struct Commands {
        pub nodes: Vec<CommandNode>,
        pub root_index: VarInt,
    }
}

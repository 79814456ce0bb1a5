//! Error types for the protocol layer.
//!
//! Decoding and encoding fail in different ways and are handled by
//! different callers: a [`DecodeError`] is always the client's fault and
//! ends the connection, while an [`EncodeError`] means the server tried to
//! send something the wire format cannot carry.

use crate::version::{Direction, ProtocolVersion, Stage};

/// Errors produced while turning bytes into values.
///
/// Every variant is fatal for the connection that produced the bytes.
/// The state machine never tries to resynchronise after one of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The input ended before the shape was complete.
    #[error("unexpected end of input: {needed} more byte(s) required")]
    UnexpectedEof { needed: usize },

    /// A variable-length integer used more groups than its bit width allows.
    #[error("variable-length integer exceeds {max_bytes} bytes")]
    VarIntTooLong { max_bytes: usize },

    /// A length or count prefix was negative.
    #[error("negative length prefix {0}")]
    NegativeLength(i64),

    /// A string held more characters than its declared maximum.
    #[error("string of {len} characters exceeds the maximum of {max}")]
    StringTooLong { len: usize, max: usize },

    /// A string's bytes were not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    /// A sequence held more elements than its declared maximum.
    #[error("sequence of {len} elements exceeds the maximum of {max}")]
    SequenceTooLong { len: usize, max: usize },

    /// A boolean byte was neither 0 nor 1.
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    /// A namespaced identifier contained illegal characters.
    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),

    /// A tagged union's discriminant did not name any known variant.
    #[error("unknown discriminant {value} for {ty}")]
    UnknownDiscriminant { ty: &'static str, value: i64 },

    /// A flags value carried bits the shape does not define.
    #[error("flags {flags:#x} contain bits unknown to {ty}")]
    UnknownFlags { ty: &'static str, flags: u64 },

    /// A tag tree held an unknown tag type.
    #[error("invalid tag type {0}")]
    InvalidTagType(u8),

    /// A tag tree was nested deeper than the decoder allows.
    #[error("tag tree nesting exceeds depth {0}")]
    TagTooDeep(usize),

    /// The opcode is not defined for this version, direction and stage.
    #[error("unknown opcode {opcode:#04x} for {direction} {stage} packets in protocol {version}")]
    UnknownOpcode {
        version: ProtocolVersion,
        direction: Direction,
        stage: Stage,
        opcode: i32,
    },

    /// A packet body left bytes unread.
    #[error("{0} trailing byte(s) after packet body")]
    TrailingBytes(usize),

    /// A fixed-count sequence ended up with the wrong number of elements.
    #[error("expected {expected} elements, decoded {actual}")]
    CountMismatch { expected: usize, actual: usize },

    /// A bundle was still open when the frame stream ended, or held too
    /// many packets.
    #[error("malformed bundle: {0}")]
    MalformedBundle(&'static str),
}

/// Errors produced while turning values into bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// A string is longer than the shape allows.
    #[error("string of {len} characters exceeds the maximum of {max}")]
    StringTooLong { len: usize, max: usize },

    /// A sequence is longer than the shape allows.
    #[error("sequence of {len} elements exceeds the maximum of {max}")]
    SequenceTooLong { len: usize, max: usize },

    /// A value does not fit its wire representation.
    #[error("value out of range for {ty}: {detail}")]
    OutOfRange { ty: &'static str, detail: String },

    /// Entries of a flag-gated set disagree about which parts are present.
    #[error("inconsistent optional fields in {ty}: {detail}")]
    InconsistentFlags { ty: &'static str, detail: String },

    /// The packet has no opcode in the target catalog.
    #[error("{kind} is not part of the {direction} {stage} catalog of protocol {version}")]
    NotInCatalog {
        kind: String,
        version: ProtocolVersion,
        direction: Direction,
        stage: Stage,
    },
}

/// Umbrella error for callers that deal with both directions.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Decoding inbound bytes failed.
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Encoding an outbound value failed.
    #[error("encode failed: {0}")]
    Encode(#[from] EncodeError),

    /// The message decoded fine but breaks a protocol rule, such as a
    /// handshake naming an unsupported version.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

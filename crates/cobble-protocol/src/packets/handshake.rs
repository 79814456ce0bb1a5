//! The handshake: the first frame on every connection.
//!
//! It is decoded before any version is negotiated, so its layout is the
//! same for every protocol number and it never goes through a catalog.

use crate::codec::{Decode, Encode, Reader, VarInt, Writer};
use crate::error::{DecodeError, EncodeError};
use crate::types::BoundedString;
use crate::version::ProtocolVersion;

/// The only handshake opcode.
pub const INTENTION_OPCODE: i32 = 0x00;

varint_enum! {
    /// What the client wants to do next.
    pub enum Intent {
        Status = 1,
        Login = 2,
        Transfer = 3,
    }
}

packet! {
    pub struct Intention {
        pub protocol_version: VarInt,
        pub server_address: BoundedString<255>,
        pub server_port: u16,
        pub intent: Intent,
    }
}

impl Intention {
    /// The negotiated version, if the server speaks it.
    pub fn version(&self) -> Option<ProtocolVersion> {
        ProtocolVersion::from_number(self.protocol_version.0)
    }

    /// Decodes a full handshake frame: opcode, then body.
    pub fn decode_frame(frame: &[u8]) -> Result<Self, DecodeError> {
        // The body does not depend on the version, any will do.
        let mut r = Reader::new(frame, ProtocolVersion::LATEST);
        let VarInt(opcode) = VarInt::decode(&mut r)?;
        if opcode != INTENTION_OPCODE {
            return Err(DecodeError::UnknownDiscriminant {
                ty: "handshake opcode",
                value: i64::from(opcode),
            });
        }
        let intention = Self::decode(&mut r)?;
        r.finish()?;
        Ok(intention)
    }

    /// Encodes a full handshake frame, as a client would send it.
    pub fn encode_frame(&self) -> Result<Vec<u8>, EncodeError> {
        let mut w = Writer::new(ProtocolVersion::LATEST);
        VarInt(INTENTION_OPCODE).encode(&mut w)?;
        self.encode(&mut w)?;
        Ok(w.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intention(version: i32, intent: Intent) -> Intention {
        Intention {
            protocol_version: VarInt(version),
            server_address: BoundedString::from("localhost"),
            server_port: 25565,
            intent,
        }
    }

    #[test]
    fn test_handshake_frame_layout() {
        let frame = intention(765, Intent::Login).encode_frame().unwrap();
        assert_eq!(frame[0], 0x00);
        // 765 as a VarInt is fd 05.
        assert_eq!(&frame[1..3], &[0xfd, 0x05]);
        assert_eq!(frame[frame.len() - 1], 2);
        let decoded = Intention::decode_frame(&frame).unwrap();
        assert_eq!(decoded.version(), Some(ProtocolVersion::V765));
        assert_eq!(decoded.intent, Intent::Login);
    }

    #[test]
    fn test_unsupported_version_has_no_protocol() {
        let decoded = Intention::decode_frame(&intention(47, Intent::Login).encode_frame().unwrap())
            .unwrap();
        assert_eq!(decoded.version(), None);
    }

    #[test]
    fn test_wrong_opcode_rejected() {
        let mut frame = intention(766, Intent::Transfer).encode_frame().unwrap();
        frame[0] = 0x01;
        assert!(Intention::decode_frame(&frame).is_err());
    }

    #[test]
    fn test_unknown_intent_rejected() {
        let mut frame = intention(766, Intent::Login).encode_frame().unwrap();
        let last = frame.len() - 1;
        frame[last] = 9;
        let err = Intention::decode_frame(&frame).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownDiscriminant { ty: "Intent", value: 9 }));
    }
}

//! Login stage packets.

use uuid::Uuid;

use crate::codec::{Decode, Encode, Reader, VarInt, Writer};
use crate::error::{DecodeError, EncodeError};
use crate::packets::common::{CookieRequest, CookieResponse};
use crate::text::JsonText;
use crate::types::{BoundedString, GameProfile, Ident, TrailingBytes};

// ---------------------------------------------------------------------------
// Serverbound
// ---------------------------------------------------------------------------

packet! {
    /// Login start: the name the player wants and the UUID their client
    /// believes it has.
    pub struct Hello {
        pub name: BoundedString<16>,
        pub uuid: Uuid,
    }
}

packet! {
    /// Encryption response: the shared secret and the echoed verify token,
    /// both encrypted with the server's public key.
    pub struct Key {
        pub shared_secret: Vec<u8>,
        pub verify_token: Vec<u8>,
    }
}

packet! {
    /// Answer to a [`CustomQuery`]. An absent payload means the client did
    /// not understand the channel.
    pub struct CustomQueryAnswer {
        pub transaction_id: VarInt,
        pub payload: Option<TrailingBytes<1_048_576>>,
    }
}

packet! {
    pub struct LoginAcknowledged {}
}

packet_set! {
    /// Packets the client sends while logging in.
    pub enum Serverbound / ServerboundKind (Serverbound, Login) {
        0x00 => Hello(Hello),
        0x01 => Key(Key),
        0x02 => CustomQueryAnswer(CustomQueryAnswer),
        0x03 => LoginAcknowledged(LoginAcknowledged),
    }
    inserted_in_766 {
        0x04 => CookieResponse(CookieResponse),
    }
}

// ---------------------------------------------------------------------------
// Clientbound
// ---------------------------------------------------------------------------

packet! {
    /// Ends the connection during login. The reason is JSON text.
    pub struct LoginDisconnect {
        pub reason: JsonText,
    }
}

/// Encryption request.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionRequest {
    pub server_id: BoundedString<20>,
    pub public_key: Vec<u8>,
    pub verify_token: Vec<u8>,
    /// Whether the client should contact the session service. Only sent by
    /// protocol 766 and later; older clients always do.
    pub should_authenticate: bool,
}

impl Encode for EncryptionRequest {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        self.server_id.encode(w)?;
        self.public_key.encode(w)?;
        self.verify_token.encode(w)?;
        if w.version().has_cookies() {
            self.should_authenticate.encode(w)?;
        }
        Ok(())
    }
}

impl Decode for EncryptionRequest {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            server_id: Decode::decode(r)?,
            public_key: Decode::decode(r)?,
            verify_token: Decode::decode(r)?,
            should_authenticate: if r.version().has_cookies() {
                bool::decode(r)?
            } else {
                true
            },
        })
    }
}

/// Login success: the profile the server settled on.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginFinished {
    pub profile: GameProfile,
    /// Protocol 766 only; older clients never see the field.
    pub strict_error_handling: bool,
}

impl Encode for LoginFinished {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        self.profile.encode(w)?;
        if w.version().has_cookies() {
            self.strict_error_handling.encode(w)?;
        }
        Ok(())
    }
}

impl Decode for LoginFinished {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            profile: GameProfile::decode(r)?,
            strict_error_handling: if r.version().has_cookies() {
                bool::decode(r)?
            } else {
                false
            },
        })
    }
}

packet! {
    /// Turns on frame compression for every later frame in both directions.
    pub struct LoginCompression {
        pub threshold: VarInt,
    }
}

packet! {
    /// A plugin request during login, answered by [`CustomQueryAnswer`].
    pub struct CustomQuery {
        pub transaction_id: VarInt,
        pub channel: Ident,
        pub data: TrailingBytes<1_048_576>,
    }
}

packet_set! {
    /// Packets the server sends while a client logs in.
    pub enum Clientbound / ClientboundKind (Clientbound, Login) {
        0x00 => LoginDisconnect(LoginDisconnect),
        0x01 => EncryptionRequest(EncryptionRequest),
        0x02 => LoginFinished(LoginFinished),
        0x03 => LoginCompression(LoginCompression),
        0x04 => CustomQuery(CustomQuery),
    }
    inserted_in_766 {
        0x05 => CookieRequest(CookieRequest),
    }
}

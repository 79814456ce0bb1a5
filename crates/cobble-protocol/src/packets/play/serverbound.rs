//! Packets the client sends during play.

use uuid::Uuid;

use crate::codec::{Decode, Encode, Reader, VarInt, VarLong, Writer};
use crate::error::{DecodeError, EncodeError};
use crate::packets::common::{
    ClientInformation, CookieResponse, Hand, KeepAlive, Pong, ResourcePackResponse,
    ServerboundCustomPayload,
};
use crate::types::{
    BlockPos, BoundedString, BoundedVec, FixedBitSet, Ident, RawBytes, Str, read_discriminant,
};

packet! {
    pub struct AcceptTeleportation {
        pub teleport_id: VarInt,
    }
}

packet! {
    pub struct BlockEntityTagQuery {
        pub transaction_id: VarInt,
        pub pos: BlockPos,
    }
}

packet! {
    pub struct ChangeDifficulty {
        pub difficulty: u8,
    }
}

packet! {
    pub struct ChatAck {
        pub offset: VarInt,
    }
}

/// The twenty most recent messages the client has seen, as a bit set.
pub type LastSeen = FixedBitSet<3>;

packet! {
    pub struct LastSeenUpdate {
        pub offset: VarInt,
        pub acknowledged: LastSeen,
    }
}

packet! {
    pub struct ArgumentSignature {
        pub name: BoundedString<16>,
        pub signature: [u8; 256],
    }
}

packet! {
    /// An unsigned command. Only exists from protocol 766 on; older
    /// clients always send [`SignedChatCommand`].
    pub struct ChatCommand {
        pub command: BoundedString<256>,
    }
}

packet! {
    pub struct SignedChatCommand {
        pub command: BoundedString<256>,
        pub timestamp: i64,
        pub salt: i64,
        pub argument_signatures: BoundedVec<ArgumentSignature, 8>,
        pub last_seen: LastSeenUpdate,
    }
}

packet! {
    pub struct ChatMessage {
        pub message: BoundedString<256>,
        pub timestamp: i64,
        pub salt: i64,
        pub signature: Option<[u8; 256]>,
        pub last_seen: LastSeenUpdate,
    }
}

packet! {
    pub struct ChatSessionUpdate {
        pub session_id: Uuid,
        pub expires_at: i64,
        pub public_key: BoundedVec<u8, 512>,
        pub key_signature: BoundedVec<u8, 4096>,
    }
}

packet! {
    pub struct ChunkBatchReceived {
        pub desired_chunks_per_tick: f32,
    }
}

varint_enum! {
    pub enum ClientCommandAction {
        PerformRespawn = 0,
        RequestStats = 1,
    }
}

packet! {
    pub struct ClientCommand {
        pub action: ClientCommandAction,
    }
}

packet! {
    /// Tab completion request for a partially typed command.
    pub struct CommandSuggestion {
        pub transaction_id: VarInt,
        pub command: BoundedString<32_500>,
    }
}

packet! {
    /// The client has left play and is back in configuration.
    pub struct ConfigurationAcknowledged {}
}

packet! {
    pub struct ContainerButtonClick {
        pub container_id: i8,
        pub button_id: i8,
    }
}

packet! {
    /// Item stacks are not interpreted, so everything after the container
    /// id is kept raw.
    pub struct ContainerClick {
        pub container_id: u8,
        pub rest: RawBytes,
    }
}

packet! {
    pub struct ContainerClose {
        pub container_id: u8,
    }
}

packet! {
    pub struct ContainerSlotStateChanged {
        pub slot_id: VarInt,
        pub container_id: VarInt,
        pub enabled: bool,
    }
}

packet! {
    /// Subscribes to server performance samples. Protocol 766 only.
    pub struct DebugSampleSubscription {
        pub sample_type: VarInt,
    }
}

packet! {
    pub struct EditBook {
        pub slot: VarInt,
        pub pages: BoundedVec<BoundedString<8192>, 200>,
        pub title: Option<BoundedString<128>>,
    }
}

packet! {
    pub struct EntityTagQuery {
        pub transaction_id: VarInt,
        pub entity_id: VarInt,
    }
}

/// What the player did to an entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InteractAction {
    Interact { hand: Hand },
    Attack,
    InteractAt { x: f32, y: f32, z: f32, hand: Hand },
}

impl Encode for InteractAction {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        match self {
            Self::Interact { hand } => {
                VarInt(0).encode(w)?;
                hand.encode(w)
            }
            Self::Attack => VarInt(1).encode(w),
            Self::InteractAt { x, y, z, hand } => {
                VarInt(2).encode(w)?;
                x.encode(w)?;
                y.encode(w)?;
                z.encode(w)?;
                hand.encode(w)
            }
        }
    }
}

impl Decode for InteractAction {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        match read_discriminant(r)? {
            0 => Ok(Self::Interact {
                hand: Hand::decode(r)?,
            }),
            1 => Ok(Self::Attack),
            2 => Ok(Self::InteractAt {
                x: f32::decode(r)?,
                y: f32::decode(r)?,
                z: f32::decode(r)?,
                hand: Hand::decode(r)?,
            }),
            other => Err(DecodeError::UnknownDiscriminant {
                ty: "InteractAction",
                value: i64::from(other),
            }),
        }
    }
}

packet! {
    pub struct Interact {
        pub entity_id: VarInt,
        pub action: InteractAction,
        pub sneaking: bool,
    }
}

packet! {
    pub struct JigsawGenerate {
        pub pos: BlockPos,
        pub levels: VarInt,
        pub keep_jigsaws: bool,
    }
}

packet! {
    pub struct LockDifficulty {
        pub locked: bool,
    }
}

packet! {
    pub struct MovePlayerPos {
        pub x: f64,
        pub y: f64,
        pub z: f64,
        pub on_ground: bool,
    }
}

packet! {
    pub struct MovePlayerPosRot {
        pub x: f64,
        pub y: f64,
        pub z: f64,
        pub yaw: f32,
        pub pitch: f32,
        pub on_ground: bool,
    }
}

packet! {
    pub struct MovePlayerRot {
        pub yaw: f32,
        pub pitch: f32,
        pub on_ground: bool,
    }
}

packet! {
    pub struct MovePlayerStatusOnly {
        pub on_ground: bool,
    }
}

packet! {
    pub struct MoveVehicle {
        pub x: f64,
        pub y: f64,
        pub z: f64,
        pub yaw: f32,
        pub pitch: f32,
    }
}

packet! {
    pub struct PaddleBoat {
        pub left: bool,
        pub right: bool,
    }
}

packet! {
    pub struct PickItem {
        pub slot: VarInt,
    }
}

packet! {
    /// Client-side latency check, answered immediately with a pong
    /// response carrying the same payload.
    pub struct PingRequest {
        pub payload: i64,
    }
}

packet! {
    pub struct PlaceRecipe {
        pub container_id: i8,
        pub recipe: Ident,
        pub shift_down: bool,
    }
}

packet! {
    pub struct PlayerAbilities {
        pub flags: u8,
    }
}

impl PlayerAbilities {
    pub const FLYING: u8 = 0x02;

    pub fn is_flying(&self) -> bool {
        self.flags & Self::FLYING != 0
    }
}

packet! {
    pub struct PlayerAction {
        pub action: VarInt,
        pub pos: BlockPos,
        pub face: u8,
        pub sequence: VarInt,
    }
}

packet! {
    pub struct PlayerCommand {
        pub entity_id: VarInt,
        pub action: VarInt,
        pub data: VarInt,
    }
}

packet! {
    pub struct PlayerInput {
        pub sideways: f32,
        pub forward: f32,
        pub flags: u8,
    }
}

packet! {
    pub struct RecipeBookChangeSettings {
        pub book_type: VarInt,
        pub open: bool,
        pub filtering: bool,
    }
}

packet! {
    pub struct RecipeBookSeenRecipe {
        pub recipe: Ident,
    }
}

packet! {
    pub struct RenameItem {
        pub name: Str,
    }
}

/// An advancements screen event.
#[derive(Debug, Clone, PartialEq)]
pub enum SeenAdvancements {
    OpenedTab { tab: Ident },
    ClosedScreen,
}

impl Encode for SeenAdvancements {
    fn encode(&self, w: &mut Writer) -> Result<(), EncodeError> {
        match self {
            Self::OpenedTab { tab } => {
                VarInt(0).encode(w)?;
                tab.encode(w)
            }
            Self::ClosedScreen => VarInt(1).encode(w),
        }
    }
}

impl Decode for SeenAdvancements {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        match read_discriminant(r)? {
            0 => Ok(Self::OpenedTab {
                tab: Ident::decode(r)?,
            }),
            1 => Ok(Self::ClosedScreen),
            other => Err(DecodeError::UnknownDiscriminant {
                ty: "SeenAdvancements",
                value: i64::from(other),
            }),
        }
    }
}

packet! {
    pub struct SelectTrade {
        pub item: VarInt,
    }
}

packet! {
    pub struct SetBeacon {
        pub primary: Option<VarInt>,
        pub secondary: Option<VarInt>,
    }
}

packet! {
    pub struct SetCarriedItem {
        pub slot: i16,
    }
}

packet! {
    pub struct SetCommandBlock {
        pub pos: BlockPos,
        pub command: Str,
        pub mode: VarInt,
        pub flags: u8,
    }
}

packet! {
    pub struct SetCommandMinecart {
        pub entity_id: VarInt,
        pub command: Str,
        pub track_output: bool,
    }
}

packet! {
    pub struct SetCreativeModeSlot {
        pub slot: i16,
        pub item: RawBytes,
    }
}

packet! {
    pub struct SetJigsawBlock {
        pub pos: BlockPos,
        pub name: Ident,
        pub target: Ident,
        pub pool: Ident,
        pub final_state: Str,
        pub joint: Str,
        pub selection_priority: VarInt,
        pub placement_priority: VarInt,
    }
}

packet! {
    pub struct SetStructureBlock {
        pub pos: BlockPos,
        pub update_type: VarInt,
        pub mode: VarInt,
        pub name: Str,
        pub offset: [i8; 3],
        pub size: [i8; 3],
        pub mirror: VarInt,
        pub rotation: VarInt,
        pub metadata: BoundedString<128>,
        pub integrity: f32,
        pub seed: VarLong,
        pub flags: u8,
    }
}

packet! {
    /// The four lines of an edited sign. The count is fixed, so there is
    /// no length prefix.
    pub struct SignUpdate {
        pub pos: BlockPos,
        pub is_front_text: bool,
        pub lines: [BoundedString<384>; 4],
    }
}

packet! {
    pub struct Swing {
        pub hand: Hand,
    }
}

packet! {
    pub struct TeleportToEntity {
        pub target: Uuid,
    }
}

packet! {
    pub struct UseItemOn {
        pub hand: Hand,
        pub pos: BlockPos,
        pub face: VarInt,
        pub cursor_x: f32,
        pub cursor_y: f32,
        pub cursor_z: f32,
        pub inside: bool,
        pub sequence: VarInt,
    }
}

packet! {
    pub struct UseItem {
        pub hand: Hand,
        pub sequence: VarInt,
    }
}

packet_set! {
    /// Packets the client sends during play.
    pub enum Serverbound / ServerboundKind (Serverbound, Play) {
        0x00 => AcceptTeleportation(AcceptTeleportation),
        0x01 => BlockEntityTagQuery(BlockEntityTagQuery),
        0x02 => ChangeDifficulty(ChangeDifficulty),
        0x03 => ChatAck(ChatAck),
        0x04 => SignedChatCommand(SignedChatCommand),
        0x05 => ChatMessage(ChatMessage),
        0x06 => ChatSessionUpdate(ChatSessionUpdate),
        0x07 => ChunkBatchReceived(ChunkBatchReceived),
        0x08 => ClientCommand(ClientCommand),
        0x09 => ClientInformation(ClientInformation),
        0x0a => CommandSuggestion(CommandSuggestion),
        0x0b => ConfigurationAcknowledged(ConfigurationAcknowledged),
        0x0c => ContainerButtonClick(ContainerButtonClick),
        0x0d => ContainerClick(ContainerClick),
        0x0e => ContainerClose(ContainerClose),
        0x0f => ContainerSlotStateChanged(ContainerSlotStateChanged),
        0x10 => CustomPayload(ServerboundCustomPayload),
        0x11 => EditBook(EditBook),
        0x12 => EntityTagQuery(EntityTagQuery),
        0x13 => Interact(Interact),
        0x14 => JigsawGenerate(JigsawGenerate),
        0x15 => KeepAlive(KeepAlive),
        0x16 => LockDifficulty(LockDifficulty),
        0x17 => MovePlayerPos(MovePlayerPos),
        0x18 => MovePlayerPosRot(MovePlayerPosRot),
        0x19 => MovePlayerRot(MovePlayerRot),
        0x1a => MovePlayerStatusOnly(MovePlayerStatusOnly),
        0x1b => MoveVehicle(MoveVehicle),
        0x1c => PaddleBoat(PaddleBoat),
        0x1d => PickItem(PickItem),
        0x1e => PingRequest(PingRequest),
        0x1f => PlaceRecipe(PlaceRecipe),
        0x20 => PlayerAbilities(PlayerAbilities),
        0x21 => PlayerAction(PlayerAction),
        0x22 => PlayerCommand(PlayerCommand),
        0x23 => PlayerInput(PlayerInput),
        0x24 => Pong(Pong),
        0x25 => RecipeBookChangeSettings(RecipeBookChangeSettings),
        0x26 => RecipeBookSeenRecipe(RecipeBookSeenRecipe),
        0x27 => RenameItem(RenameItem),
        0x28 => ResourcePack(ResourcePackResponse),
        0x29 => SeenAdvancements(SeenAdvancements),
        0x2a => SelectTrade(SelectTrade),
        0x2b => SetBeacon(SetBeacon),
        0x2c => SetCarriedItem(SetCarriedItem),
        0x2d => SetCommandBlock(SetCommandBlock),
        0x2e => SetCommandMinecart(SetCommandMinecart),
        0x2f => SetCreativeModeSlot(SetCreativeModeSlot),
        0x30 => SetJigsawBlock(SetJigsawBlock),
        0x31 => SetStructureBlock(SetStructureBlock),
        0x32 => SignUpdate(SignUpdate),
        0x33 => Swing(Swing),
        0x34 => TeleportToEntity(TeleportToEntity),
        0x35 => UseItemOn(UseItemOn),
        0x36 => UseItem(UseItem),
    }
    inserted_in_766 {
        0x04 => ChatCommand(ChatCommand),
        0x11 => CookieResponse(CookieResponse),
        0x13 => DebugSampleSubscription(DebugSampleSubscription),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_exact, encode_to_vec};
    use crate::version::ProtocolVersion;

    const V: ProtocolVersion = ProtocolVersion::V765;

    #[test]
    fn test_interact_variants_decode_distinctly() {
        let attack = decode_exact::<Interact>(&[5, 1, 0], V).unwrap();
        assert_eq!(attack.action, InteractAction::Attack);

        let interact = decode_exact::<Interact>(&[5, 0, 1, 1], V).unwrap();
        assert_eq!(interact.action, InteractAction::Interact { hand: Hand::Off });
        assert!(interact.sneaking);

        let mut at = vec![5, 2];
        for v in [0.5f32, 1.0, 0.25] {
            at.extend_from_slice(&v.to_be_bytes());
        }
        at.extend_from_slice(&[0, 0]);
        let interact_at = decode_exact::<Interact>(&at, V).unwrap();
        assert_eq!(
            interact_at.action,
            InteractAction::InteractAt { x: 0.5, y: 1.0, z: 0.25, hand: Hand::Main }
        );
    }

    #[test]
    fn test_interact_unknown_discriminant_rejected() {
        let err = decode_exact::<Interact>(&[5, 3, 0], V).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownDiscriminant { ty: "InteractAction", value: 3 }));
    }

    #[test]
    fn test_sign_update_has_four_unprefixed_lines() {
        let sign = SignUpdate {
            pos: BlockPos::new(1, 2, 3),
            is_front_text: true,
            lines: [
                BoundedString::from("a"),
                BoundedString::from(""),
                BoundedString::from("bc"),
                BoundedString::from(""),
            ],
        };
        let bytes = encode_to_vec(&sign, V).unwrap();
        // position, flag, then 1+1, 1, 1+2, 1
        assert_eq!(bytes.len(), 8 + 1 + 2 + 1 + 3 + 1);
        assert_eq!(decode_exact::<SignUpdate>(&bytes, V).unwrap(), sign);
    }

    #[test]
    fn test_chat_message_over_256_rejected() {
        let mut w = Writer::new(V);
        crate::types::write_string(&mut w, &"x".repeat(257), 1024).unwrap();
        w.write_bytes(&[0; 16]);
        w.write_u8(0);
        w.write_bytes(&[0, 0, 0, 0]);
        let err = decode_exact::<ChatMessage>(w.as_bytes(), V).unwrap_err();
        assert_eq!(err, DecodeError::StringTooLong { len: 257, max: 256 });
    }

    #[test]
    fn test_seen_advancements_closed_screen() {
        let seen = decode_exact::<SeenAdvancements>(&[1], V).unwrap();
        assert_eq!(seen, SeenAdvancements::ClosedScreen);
    }

    #[test]
    fn test_container_click_keeps_tail_raw() {
        let click = decode_exact::<ContainerClick>(&[3, 0xde, 0xad], V).unwrap();
        assert_eq!(click.container_id, 3);
        assert_eq!(click.rest.as_slice(), &[0xde, 0xad]);
    }
}

//! Configuration stage packets.
//!
//! Almost every shape here also appears in play, so the structs live in
//! [`common`](crate::packets::common); this module only fixes the opcode
//! layouts.

use crate::packets::common::{
    ClientInformation, ClientboundCustomPayload, CookieRequest, CookieResponse, Disconnect,
    FinishConfiguration, KeepAlive, Ping, Pong, RegistryData, ResetChat, ResourcePackPop,
    ResourcePackPush, ResourcePackResponse, SelectKnownPacks, ServerboundCustomPayload,
    StoreCookie, Transfer, UpdateEnabledFeatures, UpdateTags,
};

packet_set! {
    /// Packets the client sends while being configured.
    pub enum Serverbound / ServerboundKind (Serverbound, Configuration) {
        0x00 => ClientInformation(ClientInformation),
        0x01 => CustomPayload(ServerboundCustomPayload),
        0x02 => FinishConfiguration(FinishConfiguration),
        0x03 => KeepAlive(KeepAlive),
        0x04 => Pong(Pong),
        0x05 => ResourcePack(ResourcePackResponse),
    }
    inserted_in_766 {
        0x01 => CookieResponse(CookieResponse),
        0x07 => SelectKnownPacks(SelectKnownPacks),
    }
}

packet_set! {
    /// Packets the server sends while configuring a client.
    pub enum Clientbound / ClientboundKind (Clientbound, Configuration) {
        0x00 => CustomPayload(ClientboundCustomPayload),
        0x01 => Disconnect(Disconnect),
        0x02 => FinishConfiguration(FinishConfiguration),
        0x03 => KeepAlive(KeepAlive),
        0x04 => Ping(Ping),
        0x05 => RegistryData(RegistryData),
        0x06 => ResourcePackPop(ResourcePackPop),
        0x07 => ResourcePackPush(ResourcePackPush),
        0x08 => UpdateEnabledFeatures(UpdateEnabledFeatures),
        0x09 => UpdateTags(UpdateTags),
    }
    inserted_in_766 {
        0x00 => CookieRequest(CookieRequest),
        0x06 => ResetChat(ResetChat),
        0x0a => StoreCookie(StoreCookie),
        0x0b => Transfer(Transfer),
        0x0e => SelectKnownPacks(SelectKnownPacks),
    }
}

//! Configuration: brand, feature flags, registries, tags and packs.
//!
//! Protocol 766 first negotiates which data packs the client already
//! has, and only then sends registries. The server says it is finished
//! once nothing is left to negotiate and no required pack is pending.

use std::time::Instant;

use cobble_protocol::packets::common::{
    ClientboundCustomPayload, FinishConfiguration, Ping, ResourcePackPush, SelectKnownPacks,
    UpdateEnabledFeatures,
};
use cobble_protocol::packets::configuration::{Clientbound, Serverbound};
use cobble_protocol::{
    BoundedString, BoundedVec, Ident, Stage, Str, Text, TrailingBytes, encode_to_vec,
};
use uuid::Uuid;

use super::ConnectionMachine;
use crate::error::DisconnectReason;

#[derive(Debug, Default)]
pub(super) struct ConfigurationState {
    /// Known packs offered, reply not yet in.
    awaiting_known_packs: bool,
    content_sent: bool,
    finish_sent: bool,
    /// Brand and resource pack go out on the first configuration only.
    greeted: bool,
}

impl ConnectionMachine {
    pub(super) fn enter_configuration(&mut self) -> Result<(), DisconnectReason> {
        let version = self.data.version;
        self.configuration.awaiting_known_packs = false;
        self.configuration.content_sent = false;
        self.configuration.finish_sent = false;

        if !self.configuration.greeted {
            let channel = Ident::vanilla("brand")
                .map_err(|e| DisconnectReason::Internal(e.to_string()))?;
            let brand = encode_to_vec(&Str::from(self.services.config.brand.as_str()), version)
                .map_err(|e| DisconnectReason::Internal(e.to_string()))?;
            self.send(Clientbound::CustomPayload(ClientboundCustomPayload {
                channel,
                data: TrailingBytes::new(brand),
            }));
        }

        self.send(Clientbound::UpdateEnabledFeatures(UpdateEnabledFeatures {
            features: self.services.content.features(),
        }));

        if version.has_cookies() {
            let packs = self.services.content.known_packs();
            tracing::debug!(conn_id = %self.data.id, offered = packs.len(), "offering known packs");
            self.send(Clientbound::SelectKnownPacks(SelectKnownPacks {
                packs: BoundedVec(packs),
            }));
            self.configuration.awaiting_known_packs = true;
        } else {
            self.send_join_content()?;
        }

        if !self.configuration.greeted {
            if let Some(pack) = self.services.config.resource_pack.clone() {
                let id = Uuid::new_v3(&Uuid::NAMESPACE_URL, pack.url.as_bytes());
                tracing::debug!(conn_id = %self.data.id, %id, url = %pack.url, required = pack.required, "pushing resource pack");
                self.send(Clientbound::ResourcePackPush(ResourcePackPush {
                    id,
                    url: Str::from(pack.url),
                    hash: BoundedString::from(pack.hash),
                    required: pack.required,
                    prompt: pack.prompt.map(Text::plain),
                }));
            }
            self.configuration.greeted = true;
        }

        self.send(Clientbound::Ping(Ping { id: rand::random() }));
        Ok(())
    }

    fn send_join_content(&mut self) -> Result<(), DisconnectReason> {
        let version = self.data.version;
        let registries = self
            .services
            .content
            .registry_data(version)
            .map_err(|e| DisconnectReason::Internal(e.to_string()))?;
        for registry in registries {
            self.send(Clientbound::RegistryData(registry));
        }
        self.send(Clientbound::UpdateTags(self.services.content.tags(version)));
        self.configuration.content_sent = true;
        Ok(())
    }

    pub(super) fn on_configuration(
        &mut self,
        packet: Serverbound,
        now: Instant,
    ) -> Result<(), DisconnectReason> {
        match packet {
            Serverbound::ClientInformation(info) => self.on_client_information(info),
            Serverbound::CustomPayload(payload) => self.on_custom_payload(payload),
            Serverbound::FinishConfiguration(_) => {
                if !self.configuration.finish_sent {
                    return Err(DisconnectReason::ProtocolViolation(
                        "configuration finished before the server".into(),
                    ));
                }
                if self.data.mandatory_pack_outstanding() {
                    return Err(DisconnectReason::ResourcePackRejected);
                }
                return self.enter(Stage::Play, now);
            }
            Serverbound::KeepAlive(keepalive) => self.on_keepalive(keepalive.id, now),
            Serverbound::Pong(pong) => self.on_pong(pong.id),
            Serverbound::ResourcePack(response) => self.on_resource_pack(response)?,
            Serverbound::CookieResponse(cookie) => self.on_cookie(cookie),
            Serverbound::SelectKnownPacks(reply) => {
                if !self.configuration.awaiting_known_packs {
                    tracing::warn!(conn_id = %self.data.id, "unsolicited known packs ignored");
                    return Ok(());
                }
                tracing::debug!(conn_id = %self.data.id, known = reply.packs.0.len(), "client known packs");
                self.configuration.awaiting_known_packs = false;
                self.send_join_content()?;
            }
        }
        Ok(())
    }

    /// Configuration finish has gone out; nothing configuration-stage may
    /// follow it.
    pub(super) fn configuration_over(&self) -> bool {
        self.stage == Stage::Configuration && self.configuration.finish_sent
    }

    /// Tells the client configuration is over once nothing is pending.
    pub(super) fn try_finish_configuration(&mut self) {
        let state = &self.configuration;
        if state.finish_sent
            || !state.content_sent
            || state.awaiting_known_packs
            || !self.pending.is_empty()
            || self.data.mandatory_pack_outstanding()
        {
            return;
        }
        self.send(Clientbound::FinishConfiguration(FinishConfiguration {}));
        self.configuration.finish_sent = true;
    }
}

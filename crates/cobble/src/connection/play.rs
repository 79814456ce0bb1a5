//! Play: the join sequence, chat, commands and reconfiguration.

use std::time::Instant;

use cobble_plugin::ProtocolEvent;
use cobble_protocol::packets::play::clientbound::{
    DimensionType, GameEvent, Login, PlayerPosition, PongResponse, SetChunkCacheCenter,
    SetDefaultSpawnPosition, SpawnInfo, StartConfiguration, SystemChat,
};
use cobble_protocol::packets::play::{Clientbound, Serverbound};
use cobble_protocol::{BlockPos, Stage, Text, VarInt};

use super::{ConnectionMachine, keepalive};
use crate::error::DisconnectReason;

#[derive(Debug, Default)]
pub(super) struct PlayState {
    /// `StartConfiguration` sent, acknowledgement pending.
    reconfiguring: bool,
    /// The player has been announced as joined.
    joined: bool,
}

impl ConnectionMachine {
    pub(super) fn enter_play(&mut self) -> Result<(), DisconnectReason> {
        self.play.reconfiguring = false;
        let world = &self.services.config.world;
        let internal = |e: crate::CobbleError| DisconnectReason::Internal(e.to_string());
        let dimension = world.dimension().map_err(internal)?;
        let dimension_type_name = world.dimension_type().map_err(internal)?;
        let dimension_type = if self.data.version.has_cookies() {
            let index = self
                .services
                .content
                .dimension_type_index(&dimension_type_name)
                .ok_or_else(|| {
                    DisconnectReason::Internal(format!(
                        "dimension type {dimension_type_name} is not registered"
                    ))
                })?;
            DimensionType::Id(VarInt(index))
        } else {
            DimensionType::Named(dimension_type_name)
        };

        // Entity ids are positive i32s; the low bits of the connection id
        // are unique enough for one player entity per connection.
        let entity_id = (self.data.id.into_inner() & 0x7fff_ffff) as i32;
        let login = Login {
            entity_id,
            hardcore: world.hardcore,
            dimensions: vec![dimension.clone()],
            max_players: VarInt(world.max_players),
            view_distance: VarInt(world.view_distance),
            simulation_distance: VarInt(world.simulation_distance),
            reduced_debug_info: world.reduced_debug_info,
            show_death_screen: true,
            limited_crafting: false,
            spawn: SpawnInfo {
                dimension_type,
                dimension,
                hashed_seed: 0,
                game_mode: world.game_mode.id(),
                previous_game_mode: -1,
                is_debug: false,
                is_flat: false,
                last_death: None,
                portal_cooldown: VarInt(0),
            },
            enforces_secure_chat: world.enforces_secure_chat,
        };

        let [x, y, z] = world.spawn;
        let spawn = vec![
            Clientbound::SetDefaultSpawnPosition(SetDefaultSpawnPosition {
                pos: BlockPos::new(x, y, z),
                angle: 0.0,
            }),
            Clientbound::PlayerPosition(PlayerPosition {
                x: f64::from(x) + 0.5,
                y: f64::from(y),
                z: f64::from(z) + 0.5,
                yaw: 0.0,
                pitch: 0.0,
                relative: 0,
                teleport_id: VarInt(rand::random_range(1..i32::MAX)),
            }),
            Clientbound::GameEvent(GameEvent {
                event: GameEvent::LEVEL_CHUNKS_LOAD_START,
                param: 0.0,
            }),
            Clientbound::SetChunkCacheCenter(SetChunkCacheCenter {
                x: VarInt(x >> 4),
                z: VarInt(z >> 4),
            }),
        ];

        self.send(Clientbound::Login(login));
        self.send_bundle(spawn);

        if !self.play.joined {
            let profile = self.data.profile.clone().ok_or_else(|| {
                DisconnectReason::Internal("entered play without a profile".into())
            })?;
            tracing::info!(conn_id = %self.data.id, name = %profile.name, "player joined");
            self.play.joined = true;
            self.services.notifier.publish(ProtocolEvent::PlayerJoined {
                id: self.data.id,
                profile,
            });
        }
        Ok(())
    }

    pub(super) fn on_play(&mut self, packet: Serverbound, now: Instant) -> Result<(), DisconnectReason> {
        self.run_hooks(|bus, ctx| bus.packet(ctx, &packet));
        match packet {
            Serverbound::AcceptTeleportation(accept) => {
                let id = accept.teleport_id.0;
                if let Err(expected) = keepalive::acknowledge(&mut self.data.pending_teleport, id) {
                    self.mismatch("teleport", expected.map(i64::from), i64::from(id));
                }
            }
            Serverbound::ChatMessage(chat) => self.on_chat(chat.message.into_inner()),
            Serverbound::ChatCommand(command) => self.on_command(command.command.into_inner()),
            Serverbound::SignedChatCommand(command) => {
                self.on_command(command.command.into_inner());
            }
            Serverbound::CommandSuggestion(request) => {
                if let Some(response) = self.services.plugins.suggest(&self.data, &request) {
                    self.send(response);
                }
            }
            Serverbound::ConfigurationAcknowledged(_) => {
                if !self.play.reconfiguring {
                    return Err(DisconnectReason::ProtocolViolation(
                        "configuration acknowledged without a request".into(),
                    ));
                }
                return self.enter(Stage::Configuration, now);
            }
            Serverbound::Interact(interact) => {
                self.run_hooks(|bus, ctx| {
                    bus.interact(ctx, interact.entity_id.0, &interact.action, interact.sneaking);
                });
            }
            Serverbound::PingRequest(ping) => {
                self.send(Clientbound::PongResponse(PongResponse {
                    payload: ping.payload,
                }));
            }
            Serverbound::ClientInformation(info) => self.on_client_information(info),
            Serverbound::CustomPayload(payload) => self.on_custom_payload(payload),
            Serverbound::KeepAlive(keepalive) => self.on_keepalive(keepalive.id, now),
            Serverbound::Pong(pong) => self.on_pong(pong.id),
            Serverbound::ResourcePack(response) => self.on_resource_pack(response)?,
            Serverbound::CookieResponse(cookie) => self.on_cookie(cookie),
            _ => {}
        }
        Ok(())
    }

    fn on_chat(&mut self, message: String) {
        if let Some(emit) = self.run_hooks(|bus, ctx| bus.chat(ctx, &message)) {
            self.queue_emit(emit);
            return;
        }
        let name = self.data.name().unwrap_or("?");
        tracing::info!(conn_id = %self.data.id, name, message = %message, "chat");
        self.services
            .notifier
            .broadcast_chat(Text::plain(format!("<{name}> {message}")));
    }

    fn on_command(&mut self, command: String) {
        if let Some(emit) = self.run_hooks(|bus, ctx| bus.command(ctx, &command)) {
            self.queue_emit(emit);
            return;
        }
        tracing::debug!(conn_id = %self.data.id, command = %command, "unknown command");
        self.send(Clientbound::SystemChat(SystemChat {
            content: Text::plain(format!("Unknown command: /{command}")).color("red"),
            overlay: false,
        }));
    }

    /// Sends the player back to configuration. Returns `false` outside
    /// play or while a reconfiguration is already under way.
    pub fn request_reconfiguration(&mut self) -> bool {
        if self.closing || self.stage != Stage::Play || self.play.reconfiguring {
            return false;
        }
        tracing::info!(conn_id = %self.data.id, "reconfiguration requested");
        self.send(Clientbound::StartConfiguration(StartConfiguration {}));
        self.play.reconfiguring = true;
        true
    }
}

//! The per-connection state machine.
//!
//! [`ConnectionMachine`] never touches a socket. It is fed decoded-ready
//! frames, maintenance ticks and control requests, and answers with an
//! ordered list of [`Action`]s: frames to send and transport or session
//! work for the driver to carry out. The driver
//! ([`handler`](crate::handler)) owns the connection and performs them in
//! order, feeding the results of the asynchronous ones back in.
//!
//! ```text
//! Login ──ack──▶ Configuration ──finish──▶ Play
//!                      ▲                     │
//!                      └──configuration ack──┘
//! ```

mod configuration;
mod keepalive;
mod login;
mod play;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use cobble_plugin::{Emit, HookContext, Notifier, Outgoing, PluginBus, ProtocolEvent};
use cobble_protocol::packets::common::{
    ClientInformation, CookieResponse, Disconnect, KeepAlive, ResourcePackPush,
    ResourcePackResponse, ServerboundCustomPayload,
};
use cobble_protocol::packets::login::{CustomQuery, LoginDisconnect};
use cobble_protocol::packets::{configuration as config_packets, login as login_packets,
    play as play_packets,
};
use cobble_protocol::{
    EncodeError, GameProfile, PacketSet, Protocol, ProtocolRegistry, ProtocolVersion, Stage, Str,
    Text, TrailingBytes, VarInt, decode_exact, encode_bundle,
};
use cobble_session::{ConnectionData, PendingPack, ServerKey};
use cobble_transport::ConnectionId;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::content::{JoinContent, VanillaContent};
use crate::error::DisconnectReason;

use self::configuration::ConfigurationState;
use self::login::LoginState;
use self::play::PlayState;

/// Something the driver must do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Send one packet (opcode and body).
    Send(Vec<u8>),
    /// Compress packets from here on.
    EnableCompression(u32),
    /// Encrypt the stream from here on with this shared secret.
    EnableEncryption(Vec<u8>),
    /// Verify the player, then report back through
    /// [`ConnectionMachine::authenticated`].
    Authenticate {
        name: String,
        server_hash: String,
        online_mode: bool,
    },
    /// Register the identity with the player registry, then report back
    /// through [`ConnectionMachine::claimed`].
    Claim(GameProfile),
    /// Close the connection. Nothing follows.
    Close(DisconnectReason),
}

/// Everything a connection shares with the rest of the server.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<ServerConfig>,
    pub protocols: Arc<ProtocolRegistry>,
    pub plugins: Arc<PluginBus>,
    pub notifier: Notifier,
    pub content: Arc<dyn JoinContent>,
    pub server_key: Option<Arc<dyn ServerKey>>,
}

impl Services {
    /// Services with no plugins, no listeners, vanilla content and no
    /// server key.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            protocols: Arc::new(ProtocolRegistry::new()),
            plugins: Arc::new(PluginBus::empty()),
            notifier: Notifier::disabled(),
            content: Arc::new(VanillaContent),
            server_key: None,
        }
    }

    pub fn with_plugins(mut self, plugins: Arc<PluginBus>) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_content(mut self, content: Arc<dyn JoinContent>) -> Self {
        self.content = content;
        self
    }

    pub fn with_server_key(mut self, key: Arc<dyn ServerKey>) -> Self {
        self.server_key = Some(key);
        self
    }
}

/// Protocol state of one connection, from login until it closes.
pub struct ConnectionMachine {
    services: Services,
    stage: Stage,
    data: ConnectionData,
    started: Instant,
    actions: VecDeque<Action>,
    /// Plugin output waiting for the next idle point.
    pending: VecDeque<Outgoing>,
    login: LoginState,
    configuration: ConfigurationState,
    play: PlayState,
    closing: bool,
    torn_down: bool,
}

impl ConnectionMachine {
    /// A machine in the login stage for a client that negotiated
    /// `version`.
    pub fn new(services: Services, id: ConnectionId, version: ProtocolVersion, now: Instant) -> Self {
        services.notifier.publish(ProtocolEvent::StageEntered {
            id,
            stage: Stage::Login,
        });
        Self {
            services,
            stage: Stage::Login,
            data: ConnectionData::new(id, version),
            started: now,
            actions: VecDeque::new(),
            pending: VecDeque::new(),
            login: LoginState::default(),
            configuration: ConfigurationState::default(),
            play: PlayState::default(),
            closing: false,
            torn_down: false,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.data.id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn version(&self) -> ProtocolVersion {
        self.data.version
    }

    pub fn data(&self) -> &ConnectionData {
        &self.data
    }

    /// Whether a close has been decided. Input is ignored from then on.
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub fn next_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    pub fn drain_actions(&mut self) -> Vec<Action> {
        self.actions.drain(..).collect()
    }

    // -- Input ---------------------------------------------------------------

    /// Processes one inbound packet. A frame that does not decode against
    /// the active catalog ends the connection.
    pub fn handle_frame(&mut self, frame: &[u8], now: Instant) {
        if self.closing {
            return;
        }
        let protocols = Arc::clone(&self.services.protocols);
        let protocol = protocols.get(self.data.version);
        let outcome = match self.stage {
            Stage::Login => match protocol.decode::<login_packets::Serverbound>(frame) {
                Ok(packet) => self.on_login(packet, now),
                Err(e) => Err(DisconnectReason::Decode(e.to_string())),
            },
            Stage::Configuration => {
                match protocol.decode::<config_packets::Serverbound>(frame) {
                    Ok(packet) => self.on_configuration(packet, now),
                    Err(e) => Err(DisconnectReason::Decode(e.to_string())),
                }
            }
            Stage::Play => match protocol.decode::<play_packets::Serverbound>(frame) {
                Ok(packet) => self.on_play(packet, now),
                Err(e) => Err(DisconnectReason::Decode(e.to_string())),
            },
        };
        match outcome {
            Ok(()) => self.idle(),
            Err(reason) => self.disconnect(reason),
        }
    }

    /// Idle maintenance: flushes queued plugin output, runs the stage's
    /// heartbeat and enforces timeouts.
    pub fn maintain(&mut self, now: Instant) {
        if self.closing {
            return;
        }
        self.idle();
        if self.closing {
            return;
        }
        let outcome = match self.stage {
            Stage::Login => self.check_login_deadline(now),
            Stage::Configuration | Stage::Play => self.heartbeat(now),
        };
        if let Err(reason) = outcome {
            self.disconnect(reason);
        }
    }

    /// Disconnects on behalf of another part of the server.
    pub fn kick(&mut self, reason: Text) {
        self.disconnect(DisconnectReason::Kicked(reason));
    }

    /// Shows a system message. Only play has a chat to show it in.
    pub fn system_chat(&mut self, message: Text) {
        if self.closing {
            return;
        }
        if self.stage != Stage::Play {
            tracing::debug!(conn_id = %self.data.id, stage = %self.stage, "system chat outside play dropped");
            return;
        }
        self.send(play_packets::Clientbound::SystemChat(
            play_packets::clientbound::SystemChat {
                content: message,
                overlay: false,
            },
        ));
    }

    /// Fires the teardown hooks of the current stage. Runs once, however
    /// often it is called.
    pub fn teardown(&mut self, reason: &str) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.closing = true;
        self.services.plugins.teardown(self.stage, &self.data);
        self.services.notifier.publish(ProtocolEvent::PlayerLeft {
            id: self.data.id,
            profile: self.data.profile.clone(),
            stage: self.stage,
            reason: reason.to_string(),
        });
        tracing::debug!(conn_id = %self.data.id, stage = %self.stage, reason, "connection torn down");
    }

    // -- Stage transitions ---------------------------------------------------

    /// Moves to `stage`. The keep-alive clock restarts at `now`, so the
    /// first beat of a stage waits one full interval.
    fn enter(&mut self, stage: Stage, now: Instant) -> Result<(), DisconnectReason> {
        if !self.stage.can_transition_to(stage) {
            return Err(DisconnectReason::ProtocolViolation(format!(
                "no transition from {} to {stage}",
                self.stage
            )));
        }
        tracing::info!(conn_id = %self.data.id, from = %self.stage, to = %stage, "stage transition");
        self.stage = stage;
        self.pending.clear();
        self.data.keepalive.pending = None;
        self.data.keepalive.last_sent = Some(now);
        self.data.keepalive.missed = 0;
        self.data.pending_ping = None;
        match stage {
            Stage::Configuration => self.enter_configuration()?,
            Stage::Play => self.enter_play()?,
            Stage::Login => {}
        }
        self.services.notifier.publish(ProtocolEvent::StageEntered {
            id: self.data.id,
            stage,
        });
        self.run_hooks(|bus, ctx| bus.stage_init(ctx));
        Ok(())
    }

    /// The end of a batch of input: queued plugin output goes out and the
    /// stage gets a chance to move its negotiation along.
    fn idle(&mut self) {
        if self.closing {
            return;
        }
        if self.configuration_over() {
            if !self.pending.is_empty() {
                tracing::debug!(
                    conn_id = %self.data.id,
                    dropped = self.pending.len(),
                    "configuration over, queued output dropped"
                );
                self.pending.clear();
            }
            return;
        }
        while let Some(packet) = self.pending.pop_front() {
            self.send_outgoing(packet);
        }
        match self.stage {
            Stage::Login => self.try_finish_login(),
            Stage::Configuration => self.try_finish_configuration(),
            Stage::Play => {}
        }
    }

    pub(crate) fn disconnect(&mut self, reason: DisconnectReason) {
        if self.closing {
            return;
        }
        tracing::info!(conn_id = %self.data.id, stage = %self.stage, %reason, "disconnecting");
        let message = reason.message();
        let packet: Outgoing = match self.stage {
            Stage::Login => login_packets::Clientbound::LoginDisconnect(LoginDisconnect {
                reason: message.into(),
            })
            .into(),
            Stage::Configuration => {
                config_packets::Clientbound::Disconnect(Disconnect { reason: message }).into()
            }
            Stage::Play => {
                play_packets::Clientbound::Disconnect(Disconnect { reason: message }).into()
            }
        };
        self.pending.clear();
        match self.encode(&packet) {
            Ok(frame) => self.actions.push_back(Action::Send(frame)),
            Err(e) => tracing::warn!(conn_id = %self.data.id, error = %e, "disconnect packet not encodable"),
        }
        self.closing = true;
        self.actions.push_back(Action::Close(reason));
    }

    // -- Plugins -------------------------------------------------------------

    /// Runs hooks with a context for this connection and queues whatever
    /// they send.
    fn run_hooks<T>(&mut self, f: impl FnOnce(&PluginBus, &mut HookContext<'_>) -> T) -> T {
        let plugins = Arc::clone(&self.services.plugins);
        let mut ctx = HookContext::new(self.stage, &mut self.data, &self.services.notifier);
        let out = f(&plugins, &mut ctx);
        let emitted = ctx.take_emitted();
        for emit in emitted {
            self.queue_emit(emit);
        }
        out
    }

    fn queue_emit(&mut self, emit: Emit) {
        let packet = match emit {
            Emit::Payload { channel, data } if self.stage == Stage::Login => {
                let transaction_id = self.login.next_transaction();
                login_packets::Clientbound::CustomQuery(CustomQuery {
                    transaction_id: VarInt(transaction_id),
                    channel,
                    data: TrailingBytes::new(data),
                })
                .into()
            }
            other => match other.into_packet(self.stage) {
                Some(packet) => packet,
                None => return,
            },
        };
        self.pending.push_back(packet);
    }

    // -- Output --------------------------------------------------------------

    fn send(&mut self, packet: impl Into<Outgoing>) {
        self.send_outgoing(packet.into());
    }

    /// Sends one packet now. Packets for another stage are dropped, and
    /// play packets pass the outbound filters first.
    fn send_outgoing(&mut self, packet: Outgoing) {
        if packet.stage() != self.stage {
            tracing::warn!(
                conn_id = %self.data.id,
                stage = %self.stage,
                packet_stage = %packet.stage(),
                "packet for another stage dropped"
            );
            return;
        }
        if let Outgoing::Play(p) = &packet {
            let always = matches!(p, play_packets::Clientbound::Disconnect(_));
            if !always && !self.services.plugins.allow_outbound(&self.data, p) {
                tracing::debug!(conn_id = %self.data.id, kind = ?p.kind(), "outbound packet filtered");
                return;
            }
        }
        self.track(&packet);
        match self.encode(&packet) {
            Ok(frame) => self.actions.push_back(Action::Send(frame)),
            Err(e) => {
                tracing::warn!(conn_id = %self.data.id, error = %e, "outbound packet not encodable");
            }
        }
    }

    /// Sends play packets as one bundle, after filtering each member.
    fn send_bundle(&mut self, packets: Vec<play_packets::Clientbound>) {
        let packets = self.services.plugins.filter_bundle(&self.data, packets);
        for packet in &packets {
            self.track_play(packet);
        }
        let protocols = Arc::clone(&self.services.protocols);
        let catalog = protocols.get(self.data.version).catalog::<play_packets::Clientbound>();
        match encode_bundle(catalog, &packets) {
            Ok(frames) => self.actions.extend(frames.into_iter().map(Action::Send)),
            Err(e) => tracing::warn!(conn_id = %self.data.id, error = %e, "bundle not encodable"),
        }
    }

    fn encode(&self, packet: &Outgoing) -> Result<Vec<u8>, EncodeError> {
        let protocol: &Protocol = self.services.protocols.get(self.data.version);
        match packet {
            Outgoing::Login(p) => protocol.encode(p),
            Outgoing::Configuration(p) => protocol.encode(p),
            Outgoing::Play(p) => protocol.encode(p),
        }
    }

    /// Records the ids a sent packet makes the client acknowledge.
    fn track(&mut self, packet: &Outgoing) {
        match packet {
            Outgoing::Login(p) => self.track_login(p),
            Outgoing::Configuration(p) => match p {
                config_packets::Clientbound::ResourcePackPush(push) => self.track_pack_push(push),
                config_packets::Clientbound::ResourcePackPop(pop) => self.track_pack_pop(pop.id),
                config_packets::Clientbound::Ping(ping) => self.data.pending_ping = Some(ping.id),
                _ => {}
            },
            Outgoing::Play(p) => self.track_play(p),
        }
    }

    fn track_play(&mut self, packet: &play_packets::Clientbound) {
        match packet {
            play_packets::Clientbound::ResourcePackPush(push) => self.track_pack_push(push),
            play_packets::Clientbound::ResourcePackPop(pop) => self.track_pack_pop(pop.id),
            play_packets::Clientbound::Ping(ping) => self.data.pending_ping = Some(ping.id),
            play_packets::Clientbound::PlayerPosition(position) => {
                self.data.pending_teleport = Some(position.teleport_id.0);
            }
            _ => {}
        }
    }

    fn track_pack_push(&mut self, push: &ResourcePackPush) {
        self.data.resource_packs.insert(
            push.id,
            PendingPack {
                required: push.required,
            },
        );
    }

    fn track_pack_pop(&mut self, id: Option<Uuid>) {
        match id {
            Some(id) => {
                self.data.resource_packs.remove(&id);
            }
            None => self.data.resource_packs.clear(),
        }
    }

    // -- Handling shared by configuration and play ---------------------------

    fn on_client_information(&mut self, info: ClientInformation) {
        tracing::debug!(
            conn_id = %self.data.id,
            locale = %info.locale,
            view_distance = info.view_distance,
            "client information"
        );
        self.data.client_information = info.clone();
        self.run_hooks(|bus, ctx| bus.client_information(ctx, &info));
    }

    fn on_custom_payload(&mut self, payload: ServerboundCustomPayload) {
        let channel = payload.channel;
        let data = payload.data.0;
        if channel.namespace() == "minecraft" && channel.path() == "brand" {
            match decode_exact::<Str>(&data, self.data.version) {
                Ok(brand) => {
                    tracing::debug!(conn_id = %self.data.id, brand = %brand, "client brand");
                    self.data.brand = Some(brand.into_inner());
                }
                Err(e) => tracing::debug!(conn_id = %self.data.id, error = %e, "unreadable brand"),
            }
        }
        if let Some(emit) = self.run_hooks(|bus, ctx| bus.custom_payload(ctx, &channel, &data)) {
            self.queue_emit(emit);
        }
    }

    fn on_cookie(&mut self, cookie: CookieResponse) {
        let payload = cookie.payload.as_ref().map(|p| p.0.as_slice());
        if let Some(emit) = self.run_hooks(|bus, ctx| bus.cookie(ctx, &cookie.key, payload)) {
            self.queue_emit(emit);
        }
    }

    fn on_resource_pack(&mut self, response: ResourcePackResponse) -> Result<(), DisconnectReason> {
        let Some(pack) = self.data.resource_packs.get(&response.id).copied() else {
            tracing::warn!(
                conn_id = %self.data.id,
                pack = %response.id,
                action = ?response.action,
                "response for unknown resource pack ignored"
            );
            return Ok(());
        };
        tracing::debug!(conn_id = %self.data.id, pack = %response.id, action = ?response.action, "resource pack");
        if !response.action.is_terminal() {
            return Ok(());
        }
        self.data.resource_packs.remove(&response.id);
        if response.action.is_failure() && pack.required {
            return Err(DisconnectReason::ResourcePackRejected);
        }
        Ok(())
    }

    fn on_keepalive(&mut self, id: i64, now: Instant) {
        match keepalive::reply(&mut self.data.keepalive, id, now) {
            keepalive::Reply::Matched { latency_ms } => {
                tracing::trace!(conn_id = %self.data.id, latency_ms, "keep-alive");
                self.services.notifier.publish(ProtocolEvent::Latency {
                    id: self.data.id,
                    latency_ms,
                });
            }
            keepalive::Reply::Mismatch { expected } => self.mismatch("keep_alive", expected, id),
        }
    }

    fn on_pong(&mut self, id: i32) {
        if let Err(expected) = keepalive::acknowledge(&mut self.data.pending_ping, id) {
            self.mismatch("ping", expected.map(i64::from), i64::from(id));
        }
    }

    fn heartbeat(&mut self, now: Instant) -> Result<(), DisconnectReason> {
        // The client may already be in play and would misread a
        // configuration keep-alive.
        if self.configuration_over() {
            return Ok(());
        }
        let config = &self.services.config;
        let beat = keepalive::beat(
            &mut self.data.keepalive,
            now,
            config.keepalive_interval(),
            config.max_missed_keepalives,
        );
        match beat {
            keepalive::Beat::Idle => Ok(()),
            keepalive::Beat::Expired => Err(DisconnectReason::Timeout),
            keepalive::Beat::Send(id) => {
                let packet = KeepAlive { id };
                match self.stage {
                    Stage::Configuration => self.send(config_packets::Clientbound::KeepAlive(packet)),
                    Stage::Play => self.send(play_packets::Clientbound::KeepAlive(packet)),
                    Stage::Login => {}
                }
                Ok(())
            }
        }
    }

    /// A stale acknowledgement: logged and reported, otherwise ignored.
    fn mismatch(&self, what: &'static str, expected: Option<i64>, received: i64) {
        tracing::warn!(conn_id = %self.data.id, what, ?expected, received, "sequence mismatch ignored");
        self.services.notifier.publish(ProtocolEvent::SequenceMismatch {
            id: self.data.id,
            what,
            expected,
            received,
        });
    }
}

#[cfg(test)]
mod tests;

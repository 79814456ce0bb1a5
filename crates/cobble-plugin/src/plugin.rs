//! The `Plugin` trait and the values hooks exchange with the bus.
//!
//! Hooks are synchronous and run in the task that owns the connection, so
//! they may freely change that connection's [`ConnectionData`]. Anything
//! that touches another connection goes through the [`Notifier`] the
//! context hands out.

use cobble_protocol::packets::common::{ClientInformation, ClientboundCustomPayload};
use cobble_protocol::packets::play::serverbound::InteractAction;
use cobble_protocol::packets::{configuration, login, play};
use cobble_protocol::{GameProfile, Ident, ProtocolVersion, Stage, Text, TrailingBytes};
use cobble_session::{ConflictPolicy, ConnectionData};

use crate::{Notifier, PluginError};

// ---------------------------------------------------------------------------
// Outbound values
// ---------------------------------------------------------------------------

/// A clientbound packet of any stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Login(login::Clientbound),
    Configuration(configuration::Clientbound),
    Play(play::Clientbound),
}

impl Outgoing {
    /// The stage whose catalog can encode this packet.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Login(_) => Stage::Login,
            Self::Configuration(_) => Stage::Configuration,
            Self::Play(_) => Stage::Play,
        }
    }
}

impl From<login::Clientbound> for Outgoing {
    fn from(packet: login::Clientbound) -> Self {
        Self::Login(packet)
    }
}

impl From<configuration::Clientbound> for Outgoing {
    fn from(packet: configuration::Clientbound) -> Self {
        Self::Configuration(packet)
    }
}

impl From<play::Clientbound> for Outgoing {
    fn from(packet: play::Clientbound) -> Self {
        Self::Play(packet)
    }
}

/// Something a hook wants sent to its own client.
#[derive(Debug, Clone, PartialEq)]
pub enum Emit {
    /// A finished packet, sent as-is.
    Packet(Outgoing),
    /// Plugin bytes for `channel`; the connection wraps them in the
    /// stage's custom payload shape.
    Payload { channel: Ident, data: Vec<u8> },
}

impl Emit {
    /// Wraps a payload into the stage's custom payload packet.
    ///
    /// Login has no plain payload packet; there the connection issues a
    /// query instead, so this returns `None`.
    pub fn into_packet(self, stage: Stage) -> Option<Outgoing> {
        match self {
            Self::Packet(packet) => Some(packet),
            Self::Payload { channel, data } => {
                let payload = ClientboundCustomPayload {
                    channel,
                    data: TrailingBytes::new(data),
                };
                match stage {
                    Stage::Login => None,
                    Stage::Configuration => {
                        Some(configuration::Clientbound::CustomPayload(payload).into())
                    }
                    Stage::Play => Some(play::Clientbound::CustomPayload(payload).into()),
                }
            }
        }
    }
}

/// What a channel-style hook answers with.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HookResponse {
    /// Nothing to send. For chat and command hooks the next plugin is asked.
    #[default]
    None,
    /// A packet sent as-is, without channel wrapping.
    Native(Outgoing),
    /// Bytes the connection wraps into a custom payload on the hook's
    /// channel.
    Opaque(Vec<u8>),
}

impl HookResponse {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Resolves the response against the channel the hook answered on.
    pub(crate) fn into_emit(self, channel: &Ident) -> Option<Emit> {
        match self {
            Self::None => None,
            Self::Native(packet) => Some(Emit::Packet(packet)),
            Self::Opaque(data) => Some(Emit::Payload {
                channel: channel.clone(),
                data,
            }),
        }
    }
}

/// Answer of a veto hook.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Verdict {
    #[default]
    Allow,
    /// Refuse, with the reason the client is shown.
    Deny(Text),
}

// ---------------------------------------------------------------------------
// HookContext
// ---------------------------------------------------------------------------

/// The connection a hook runs for.
pub struct HookContext<'a> {
    stage: Stage,
    data: &'a mut ConnectionData,
    notifier: &'a Notifier,
    emitted: Vec<Emit>,
}

impl<'a> HookContext<'a> {
    pub fn new(stage: Stage, data: &'a mut ConnectionData, notifier: &'a Notifier) -> Self {
        Self {
            stage,
            data,
            notifier,
            emitted: Vec::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn version(&self) -> ProtocolVersion {
        self.data.version
    }

    pub fn data(&self) -> &ConnectionData {
        self.data
    }

    pub fn data_mut(&mut self) -> &mut ConnectionData {
        self.data
    }

    /// Reaches other connections and async listeners.
    pub fn notifier(&self) -> &Notifier {
        self.notifier
    }

    /// Queues a packet for this client.
    pub fn send(&mut self, packet: impl Into<Outgoing>) {
        self.emitted.push(Emit::Packet(packet.into()));
    }

    /// Queues plugin bytes for this client on `channel`.
    pub fn send_payload(&mut self, channel: Ident, data: impl Into<Vec<u8>>) {
        self.emitted.push(Emit::Payload {
            channel,
            data: data.into(),
        });
    }

    /// Everything queued so far, oldest first.
    pub fn take_emitted(&mut self) -> Vec<Emit> {
        std::mem::take(&mut self.emitted)
    }
}

// ---------------------------------------------------------------------------
// Plugin
// ---------------------------------------------------------------------------

/// An extension the connection consults at fixed points.
///
/// Every hook has a no-op default, so a plugin only implements what it
/// cares about. Channel and cookie hooks are only called for the keys the
/// plugin claimed in its [`Registration`](crate::Registration).
///
/// # Example
///
/// ```rust
/// use cobble_plugin::{HookContext, HookResponse, Plugin, PluginError};
/// use cobble_protocol::Ident;
///
/// /// Echoes every payload on its channel back to the sender.
/// struct Echo;
///
/// impl Plugin for Echo {
///     fn name(&self) -> &str {
///         "echo"
///     }
///
///     fn on_custom_payload(
///         &self,
///         _ctx: &mut HookContext<'_>,
///         _channel: &Ident,
///         data: &[u8],
///     ) -> Result<HookResponse, PluginError> {
///         Ok(HookResponse::Opaque(data.to_vec()))
///     }
/// }
/// ```
pub trait Plugin: Send + Sync + 'static {
    /// Name used in logs and registration errors.
    fn name(&self) -> &str;

    /// The connection entered a stage the plugin is registered for.
    /// Packets queued on `ctx` go out before the stage's own maintenance.
    fn on_stage_init(&self, _ctx: &mut HookContext<'_>) -> Result<(), PluginError> {
        Ok(())
    }

    /// The connection is going away while in `stage`. Runs on every exit
    /// path, including errors.
    fn on_teardown(&self, _stage: Stage, _data: &ConnectionData) -> Result<(), PluginError> {
        Ok(())
    }

    /// Whether a player may log in under `name`.
    fn allow_name(&self, _name: &str, _version: ProtocolVersion) -> Result<Verdict, PluginError> {
        Ok(Verdict::Allow)
    }

    /// Picks how to treat `newcomer` when `existing` sessions hold the same
    /// identity. `None` leaves the decision to the next plugin.
    fn on_join_conflict(
        &self,
        _newcomer: &GameProfile,
        _existing: &[GameProfile],
    ) -> Result<Option<ConflictPolicy>, PluginError> {
        Ok(None)
    }

    /// The client reported new settings. They are already stored in the
    /// connection record.
    fn on_client_information(
        &self,
        _ctx: &mut HookContext<'_>,
        _info: &ClientInformation,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    fn on_custom_payload(
        &self,
        _ctx: &mut HookContext<'_>,
        _channel: &Ident,
        _data: &[u8],
    ) -> Result<HookResponse, PluginError> {
        Ok(HookResponse::None)
    }

    /// A cookie the plugin requested came back. `payload` is `None` when
    /// the client had no such cookie.
    fn on_cookie(
        &self,
        _ctx: &mut HookContext<'_>,
        _key: &Ident,
        _payload: Option<&[u8]>,
    ) -> Result<HookResponse, PluginError> {
        Ok(HookResponse::None)
    }

    /// The answer to a login query the plugin sent on `channel`. `payload`
    /// is `None` when the client did not understand the query.
    fn on_login_query_answer(
        &self,
        _ctx: &mut HookContext<'_>,
        _channel: &Ident,
        _payload: Option<&[u8]>,
    ) -> Result<HookResponse, PluginError> {
        Ok(HookResponse::None)
    }

    fn on_chat(
        &self,
        _ctx: &mut HookContext<'_>,
        _message: &str,
    ) -> Result<HookResponse, PluginError> {
        Ok(HookResponse::None)
    }

    /// A command, without its leading slash.
    fn on_command(
        &self,
        _ctx: &mut HookContext<'_>,
        _command: &str,
    ) -> Result<HookResponse, PluginError> {
        Ok(HookResponse::None)
    }

    fn on_interact(
        &self,
        _ctx: &mut HookContext<'_>,
        _entity_id: i32,
        _action: &InteractAction,
        _sneaking: bool,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    /// Observes every decoded play packet before the connection handles it.
    fn on_packet(
        &self,
        _ctx: &mut HookContext<'_>,
        _packet: &play::Serverbound,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    /// Whether an outbound play packet may be sent. Bundles are filtered
    /// member by member.
    fn filter_outbound(
        &self,
        _data: &ConnectionData,
        _packet: &play::Clientbound,
    ) -> Result<bool, PluginError> {
        Ok(true)
    }
}

//! Integration tests for plugin dispatch.
//!
//! These drive the bus the way a connection does: build it once, then
//! call hooks with a context for one connection's record.

use std::sync::{Arc, Mutex};

use cobble_plugin::{
    CommandSuggester, Emit, HookContext, HookResponse, Notifier, Outgoing, Plugin, PluginBus,
    PluginError, Registration, StaticSuggester, Suggestions, Verdict,
};
use cobble_protocol::packets::common::ClientInformation;
use cobble_protocol::packets::play::clientbound::{SetTime, SystemChat};
use cobble_protocol::packets::play::serverbound::CommandSuggestion;
use cobble_protocol::packets::{configuration, play};
use cobble_protocol::{
    BoundedString, GameProfile, Ident, ProtocolVersion, Stage, Text, VarInt,
};
use cobble_session::{ConflictPolicy, ConnectionData};
use cobble_transport::ConnectionId;
use uuid::Uuid;

// =========================================================================
// Test plugins
// =========================================================================

/// Appends `label:hook` to a shared log on every call.
struct Logger {
    label: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl Logger {
    fn record(&self, hook: &str) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{hook}", self.label));
    }
}

impl Plugin for Logger {
    fn name(&self) -> &str {
        self.label
    }

    fn on_stage_init(&self, ctx: &mut HookContext<'_>) -> Result<(), PluginError> {
        self.record(&format!("init-{}", ctx.stage()));
        Ok(())
    }

    fn on_teardown(&self, stage: Stage, _data: &ConnectionData) -> Result<(), PluginError> {
        self.record(&format!("teardown-{stage}"));
        Ok(())
    }

    fn on_chat(
        &self,
        _ctx: &mut HookContext<'_>,
        _message: &str,
    ) -> Result<HookResponse, PluginError> {
        self.record("chat");
        Ok(HookResponse::None)
    }
}

/// Refuses one name.
struct Ban(&'static str);

impl Plugin for Ban {
    fn name(&self) -> &str {
        "ban"
    }

    fn allow_name(&self, name: &str, _version: ProtocolVersion) -> Result<Verdict, PluginError> {
        if name.eq_ignore_ascii_case(self.0) {
            Ok(Verdict::Deny(Text::plain("You are banned")))
        } else {
            Ok(Verdict::Allow)
        }
    }
}

/// Panics in every hook it implements.
struct Faulty;

impl Plugin for Faulty {
    fn name(&self) -> &str {
        "faulty"
    }

    fn allow_name(&self, _name: &str, _version: ProtocolVersion) -> Result<Verdict, PluginError> {
        panic!("allow_name exploded");
    }

    fn on_teardown(&self, _stage: Stage, _data: &ConnectionData) -> Result<(), PluginError> {
        panic!("teardown exploded");
    }

    fn on_chat(
        &self,
        _ctx: &mut HookContext<'_>,
        _message: &str,
    ) -> Result<HookResponse, PluginError> {
        Err(PluginError::Failed("chat backend down".into()))
    }

    fn on_custom_payload(
        &self,
        _ctx: &mut HookContext<'_>,
        _channel: &Ident,
        _data: &[u8],
    ) -> Result<HookResponse, PluginError> {
        panic!("payload exploded");
    }
}

/// Echoes payloads and stores the locale the client reports.
struct Echo;

impl Plugin for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn on_custom_payload(
        &self,
        _ctx: &mut HookContext<'_>,
        _channel: &Ident,
        data: &[u8],
    ) -> Result<HookResponse, PluginError> {
        Ok(HookResponse::Opaque(data.iter().rev().copied().collect()))
    }

    fn on_client_information(
        &self,
        ctx: &mut HookContext<'_>,
        info: &ClientInformation,
    ) -> Result<(), PluginError> {
        ctx.data_mut().brand = Some(format!("seen {}", info.locale));
        Ok(())
    }

    fn on_command(
        &self,
        _ctx: &mut HookContext<'_>,
        command: &str,
    ) -> Result<HookResponse, PluginError> {
        if command != "ping" {
            return Ok(HookResponse::None);
        }
        Ok(HookResponse::Native(Outgoing::Play(play::Clientbound::SystemChat(
            SystemChat {
                content: Text::plain("pong"),
                overlay: false,
            },
        ))))
    }
}

/// Drops time updates.
struct NoTime;

impl Plugin for NoTime {
    fn name(&self) -> &str {
        "no-time"
    }

    fn filter_outbound(
        &self,
        _data: &ConnectionData,
        packet: &play::Clientbound,
    ) -> Result<bool, PluginError> {
        Ok(!matches!(packet, play::Clientbound::SetTime(_)))
    }
}

/// Always asks to reject the newcomer.
struct Strict;

impl Plugin for Strict {
    fn name(&self) -> &str {
        "strict"
    }

    fn on_join_conflict(
        &self,
        _newcomer: &GameProfile,
        _existing: &[GameProfile],
    ) -> Result<Option<ConflictPolicy>, PluginError> {
        Ok(Some(ConflictPolicy::RejectNew))
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn id(s: &str) -> Ident {
    s.parse().unwrap()
}

fn record() -> ConnectionData {
    ConnectionData::new(ConnectionId::new(7), ProtocolVersion::V766)
}

fn system_chat(text: &str) -> play::Clientbound {
    play::Clientbound::SystemChat(SystemChat {
        content: Text::plain(text),
        overlay: false,
    })
}

// =========================================================================
// Ordering and stages
// =========================================================================

#[test]
fn test_stage_init_runs_in_priority_order_for_bound_stage() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut builder = PluginBus::builder();
    builder.register(
        Logger { label: "late", log: log.clone() },
        Registration::new().priority(1),
    );
    builder.register(
        Logger { label: "early", log: log.clone() },
        Registration::new().priority(10),
    );
    builder.register(
        Logger { label: "play-only", log: log.clone() },
        Registration::new().priority(100).stage(Stage::Play),
    );
    let bus = builder.build().unwrap();

    let mut data = record();
    let notifier = Notifier::disabled();
    bus.stage_init(&mut HookContext::new(Stage::Configuration, &mut data, &notifier));

    assert_eq!(
        *log.lock().unwrap(),
        ["early:init-configuration", "late:init-configuration"]
    );
}

#[test]
fn test_teardown_runs_every_hook_even_after_failure() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut builder = PluginBus::builder();
    builder.register(Faulty, Registration::new().priority(50));
    builder.register(Logger { label: "a", log: log.clone() }, Registration::new());
    let bus = builder.build().unwrap();

    bus.teardown(Stage::Play, &record());

    assert_eq!(*log.lock().unwrap(), ["a:teardown-play"]);
}

// =========================================================================
// Veto hooks
// =========================================================================

#[test]
fn test_allow_name_first_denial_wins_and_panics_are_ignored() {
    let mut builder = PluginBus::builder();
    builder.register(Faulty, Registration::new().priority(10));
    builder.register(Ban("Griefer"), Registration::new().stage(Stage::Login));
    let bus = builder.build().unwrap();

    assert!(bus.allow_name("Steve", ProtocolVersion::V765).is_ok());
    let reason = bus.allow_name("griefer", ProtocolVersion::V765).unwrap_err();
    assert_eq!(reason.to_plain(), "You are banned");
}

#[test]
fn test_join_conflict_plugin_overrides_default() {
    let profile = GameProfile::new(Uuid::from_u128(1), "Steve");
    let bus = PluginBus::empty();
    assert_eq!(
        bus.join_conflict(&profile, &[profile.clone()], ConflictPolicy::KickExisting),
        ConflictPolicy::KickExisting
    );

    let mut builder = PluginBus::builder();
    builder.register(Strict, Registration::new());
    let bus = builder.build().unwrap();
    assert_eq!(
        bus.join_conflict(&profile, &[profile.clone()], ConflictPolicy::KickExisting),
        ConflictPolicy::RejectNew
    );
}

// =========================================================================
// Channels
// =========================================================================

#[test]
fn test_custom_payload_routes_to_owner_and_wraps_opaque() {
    let mut builder = PluginBus::builder();
    builder.register(Echo, Registration::new().channel(id("cobble:echo")));
    let bus = builder.build().unwrap();
    let mut data = record();
    let notifier = Notifier::disabled();
    let mut ctx = HookContext::new(Stage::Configuration, &mut data, &notifier);

    let emit = bus
        .custom_payload(&mut ctx, &id("cobble:echo"), &[1, 2, 3])
        .unwrap();
    assert_eq!(
        emit,
        Emit::Payload {
            channel: id("cobble:echo"),
            data: vec![3, 2, 1]
        }
    );
    match emit.into_packet(Stage::Configuration) {
        Some(Outgoing::Configuration(configuration::Clientbound::CustomPayload(p))) => {
            assert_eq!(p.channel, id("cobble:echo"));
        }
        other => panic!("unexpected {other:?}"),
    }

    assert!(bus.custom_payload(&mut ctx, &id("cobble:other"), &[1]).is_none());
}

#[test]
fn test_custom_payload_panicking_owner_yields_no_response() {
    let mut builder = PluginBus::builder();
    builder.register(Faulty, Registration::new().channel(id("cobble:bad")));
    let bus = builder.build().unwrap();
    let mut data = record();
    let notifier = Notifier::disabled();
    let mut ctx = HookContext::new(Stage::Play, &mut data, &notifier);

    assert!(bus.custom_payload(&mut ctx, &id("cobble:bad"), &[]).is_none());
}

#[test]
fn test_client_information_hook_mutates_own_record() {
    let mut builder = PluginBus::builder();
    builder.register(Echo, Registration::new());
    let bus = builder.build().unwrap();
    let mut data = record();
    let notifier = Notifier::disabled();

    let info = ClientInformation {
        locale: BoundedString::from("de_de"),
        ..ClientInformation::default()
    };
    bus.client_information(
        &mut HookContext::new(Stage::Configuration, &mut data, &notifier),
        &info,
    );

    assert_eq!(data.brand.as_deref(), Some("seen de_de"));
}

// =========================================================================
// Chat and commands
// =========================================================================

#[test]
fn test_chat_unhandled_when_every_plugin_passes() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut builder = PluginBus::builder();
    builder.register(Faulty, Registration::new().priority(5));
    builder.register(Logger { label: "a", log: log.clone() }, Registration::new());
    let bus = builder.build().unwrap();
    let mut data = record();
    let notifier = Notifier::disabled();

    let result = bus.chat(&mut HookContext::new(Stage::Play, &mut data, &notifier), "hi");

    assert!(result.is_none());
    assert_eq!(*log.lock().unwrap(), ["a:chat"]);
}

#[test]
fn test_command_native_answer_short_circuits() {
    let mut builder = PluginBus::builder();
    builder.register(Echo, Registration::new());
    let bus = builder.build().unwrap();
    let mut data = record();
    let notifier = Notifier::disabled();
    let mut ctx = HookContext::new(Stage::Play, &mut data, &notifier);

    assert_eq!(
        bus.command(&mut ctx, "ping"),
        Some(Emit::Packet(Outgoing::Play(system_chat("pong"))))
    );
    assert!(bus.command(&mut ctx, "other").is_none());
}

#[test]
fn test_suggest_answers_with_matching_transaction() {
    let mut builder = PluginBus::builder();
    builder.suggester(StaticSuggester::new(["help", "home", "list"]));
    let bus = builder.build().unwrap();

    let request = CommandSuggestion {
        transaction_id: VarInt(42),
        command: BoundedString::from("/h"),
    };
    match bus.suggest(&record(), &request) {
        Some(play::Clientbound::CommandSuggestions(answer)) => {
            assert_eq!(answer.transaction_id, VarInt(42));
            assert_eq!(answer.start, VarInt(1));
            assert_eq!(answer.length, VarInt(1));
            assert_eq!(answer.matches.len(), 2);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(PluginBus::empty().suggest(&record(), &request).is_none());
}

/// Reports a span no client could have typed.
struct HugeSpan;

impl CommandSuggester for HugeSpan {
    fn suggest(&self, _data: &ConnectionData, _command: &str) -> Option<Suggestions> {
        Some(Suggestions {
            start: usize::MAX,
            length: 1,
            matches: Vec::new(),
        })
    }
}

#[test]
fn test_suggest_span_out_of_range_sends_nothing() {
    let mut builder = PluginBus::builder();
    builder.suggester(HugeSpan);
    let bus = builder.build().unwrap();

    let request = CommandSuggestion {
        transaction_id: VarInt(7),
        command: BoundedString::from("/x"),
    };
    assert!(bus.suggest(&record(), &request).is_none());
}

// =========================================================================
// Outbound filtering
// =========================================================================

#[test]
fn test_filter_bundle_removes_vetoed_members() {
    let mut builder = PluginBus::builder();
    builder.register(NoTime, Registration::new());
    let bus = builder.build().unwrap();

    let time = play::Clientbound::SetTime(SetTime {
        game_time: 1,
        day_time: 2,
    });
    let kept = bus.filter_bundle(&record(), vec![time.clone(), system_chat("a"), time]);

    assert_eq!(kept, vec![system_chat("a")]);
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cobble_plugin::{
    HookContext, HookResponse, Outgoing, Plugin, PluginBus, PluginError, Registration, Verdict,
};
use cobble_protocol::packets::common::{
    FinishConfiguration, KeepAlive, ResourcePackAction, ResourcePackResponse, SelectKnownPacks,
    ServerboundCustomPayload,
};
use cobble_protocol::packets::login::{CustomQueryAnswer, Hello, Key, LoginAcknowledged};
use cobble_protocol::packets::play::serverbound::{
    AcceptTeleportation, ChatCommand, ChatMessage, ConfigurationAcknowledged, LastSeenUpdate,
    PingRequest,
};
use cobble_protocol::packets::{configuration as cfg, login as lg, play};
use cobble_protocol::{
    BoundedVec, Cataloged, FixedBitSet, GameProfile, Ident, PacketSet, ProtocolRegistry,
    ProtocolVersion, Stage, Str, Text, TrailingBytes, VarInt, encode_to_vec,
};
use cobble_session::{ConnectionData, ServerKey, SessionError, offline_uuid};
use cobble_transport::ConnectionId;
use uuid::Uuid;

use super::{Action, ConnectionMachine, Services};
use crate::config::{ResourcePackConfig, ServerConfig};
use crate::error::DisconnectReason;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Plays the client side against a machine, frame by frame.
struct Client {
    machine: ConnectionMachine,
    protocols: ProtocolRegistry,
    version: ProtocolVersion,
    now: Instant,
}

impl Client {
    fn new(services: Services, version: ProtocolVersion) -> Self {
        let now = Instant::now();
        Self {
            machine: ConnectionMachine::new(services, ConnectionId::new(7), version, now),
            protocols: ProtocolRegistry::new(),
            version,
            now,
        }
    }

    fn offline(version: ProtocolVersion) -> Self {
        Self::new(Services::new(ServerConfig::default()), version)
    }

    fn with_config(config: ServerConfig, version: ProtocolVersion) -> Self {
        Self::new(Services::new(config), version)
    }

    fn with_plugins(bus: PluginBus, version: ProtocolVersion) -> Self {
        let services =
            Services::new(ServerConfig::default()).with_plugins(Arc::new(bus));
        Self::new(services, version)
    }

    fn feed<P: Cataloged>(&mut self, packet: P) {
        let frame = self.protocols.get(self.version).encode(&packet).unwrap();
        self.machine.handle_frame(&frame, self.now);
    }

    fn actions(&mut self) -> Vec<Action> {
        self.machine.drain_actions()
    }

    /// Decodes every frame sent in `actions` as a `P`.
    fn sent<P: Cataloged>(&self, actions: &[Action]) -> Vec<P> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Send(frame) => {
                    Some(self.protocols.get(self.version).decode::<P>(frame).unwrap())
                }
                _ => None,
            })
            .collect()
    }

    fn kinds<P: Cataloged + PacketSet>(&self, actions: &[Action]) -> Vec<<P as PacketSet>::Kind> {
        self.sent::<P>(actions).iter().map(PacketSet::kind).collect()
    }

    fn hello(&mut self, name: &str) {
        self.feed(lg::Serverbound::Hello(Hello {
            name: name.into(),
            uuid: Uuid::nil(),
        }));
    }

    /// Runs login up to `LoginFinished` and returns what the claim
    /// produced.
    fn login(&mut self) -> Vec<Action> {
        self.hello("Steve");
        self.actions();
        self.machine
            .authenticated(Ok(GameProfile::new(offline_uuid("Steve"), "Steve")));
        self.actions();
        self.machine.claimed(Ok(()));
        self.actions()
    }

    fn acknowledge_login(&mut self) -> Vec<Action> {
        self.feed(lg::Serverbound::LoginAcknowledged(LoginAcknowledged {}));
        self.actions()
    }

    fn select_known_packs(&mut self) -> Vec<Action> {
        self.feed(cfg::Serverbound::SelectKnownPacks(SelectKnownPacks {
            packs: BoundedVec(Vec::new()),
        }));
        self.actions()
    }

    fn finish_configuration(&mut self) -> Vec<Action> {
        self.feed(cfg::Serverbound::FinishConfiguration(FinishConfiguration {}));
        self.actions()
    }

    /// Takes a fresh client all the way into play.
    fn join(&mut self) -> Vec<Action> {
        self.login();
        self.acknowledge_login();
        if self.version.has_cookies() {
            self.select_known_packs();
        }
        self.finish_configuration()
    }
}

fn closed(actions: &[Action]) -> Option<&DisconnectReason> {
    actions.iter().find_map(|a| match a {
        Action::Close(reason) => Some(reason),
        _ => None,
    })
}

fn last_seen() -> LastSeenUpdate {
    LastSeenUpdate {
        offset: VarInt(0),
        acknowledged: FixedBitSet::default(),
    }
}

fn channel(path: &str) -> Ident {
    Ident::new("test", path).unwrap()
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// A key pair whose "encryption" is the identity.
struct PlainKey;

impl ServerKey for PlainKey {
    fn public_key_der(&self) -> &[u8] {
        b"test-key"
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, SessionError> {
        Ok(ciphertext.to_vec())
    }
}

/// Opens a login query on init and records the answers.
struct Querier {
    answers: Arc<Mutex<Vec<Option<Vec<u8>>>>>,
}

impl Plugin for Querier {
    fn name(&self) -> &str {
        "querier"
    }

    fn on_stage_init(&self, ctx: &mut HookContext<'_>) -> Result<(), PluginError> {
        ctx.send_payload(channel("query"), vec![1, 2, 3]);
        Ok(())
    }

    fn on_login_query_answer(
        &self,
        _ctx: &mut HookContext<'_>,
        _channel: &Ident,
        payload: Option<&[u8]>,
    ) -> Result<HookResponse, PluginError> {
        self.answers.lock().unwrap().push(payload.map(<[u8]>::to_vec));
        Ok(HookResponse::None)
    }
}

struct Teardowns(Arc<AtomicUsize>);

impl Plugin for Teardowns {
    fn name(&self) -> &str {
        "teardowns"
    }

    fn on_teardown(&self, _stage: Stage, _data: &ConnectionData) -> Result<(), PluginError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Counts stage initialisations.
struct Inits(Arc<AtomicUsize>);

impl Plugin for Inits {
    fn name(&self) -> &str {
        "inits"
    }

    fn on_stage_init(&self, _ctx: &mut HookContext<'_>) -> Result<(), PluginError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Bouncer;

impl Plugin for Bouncer {
    fn name(&self) -> &str {
        "bouncer"
    }

    fn allow_name(&self, name: &str, _version: ProtocolVersion) -> Result<Verdict, PluginError> {
        if name == "Herobrine" {
            return Ok(Verdict::Deny(Text::plain("not welcome")));
        }
        Ok(Verdict::Allow)
    }
}

/// Answers `/ping` and hides the chunk-load game event.
struct Pinger;

impl Plugin for Pinger {
    fn name(&self) -> &str {
        "pinger"
    }

    fn on_command(
        &self,
        _ctx: &mut HookContext<'_>,
        command: &str,
    ) -> Result<HookResponse, PluginError> {
        if command != "ping" {
            return Ok(HookResponse::None);
        }
        let reply = play::Clientbound::SystemChat(play::clientbound::SystemChat {
            content: Text::plain("pong"),
            overlay: false,
        });
        Ok(HookResponse::Native(Outgoing::from(reply)))
    }

    fn filter_outbound(
        &self,
        _data: &ConnectionData,
        packet: &play::Clientbound,
    ) -> Result<bool, PluginError> {
        Ok(!matches!(packet, play::Clientbound::GameEvent(_)))
    }
}

fn bus(plugin: impl Plugin, registration: Registration) -> PluginBus {
    let mut builder = PluginBus::builder();
    builder.register(plugin, registration);
    builder.build().unwrap()
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

#[test]
fn test_hello_offline_requests_authentication() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.hello("Steve");

    assert_eq!(
        client.actions(),
        vec![Action::Authenticate {
            name: "Steve".into(),
            server_hash: String::new(),
            online_mode: false,
        }]
    );
}

#[test]
fn test_claimed_sends_compression_before_login_finished() {
    let mut client = Client::offline(ProtocolVersion::V766);
    client.hello("Steve");
    client.actions();
    let profile = GameProfile::new(offline_uuid("Steve"), "Steve");
    client.machine.authenticated(Ok(profile.clone()));
    assert_eq!(client.actions(), vec![Action::Claim(profile.clone())]);

    client.machine.claimed(Ok(()));
    let actions = client.actions();

    assert_eq!(actions.len(), 3);
    assert_eq!(actions[1], Action::EnableCompression(256));
    let sent = client.sent::<lg::Clientbound>(&actions);
    match &sent[0] {
        lg::Clientbound::LoginCompression(c) => assert_eq!(c.threshold, VarInt(256)),
        other => panic!("expected compression, got {other:?}"),
    }
    match &sent[1] {
        lg::Clientbound::LoginFinished(f) => assert_eq!(f.profile, profile),
        other => panic!("expected login finished, got {other:?}"),
    }
}

#[test]
fn test_claimed_without_compression_only_finishes() {
    let config = ServerConfig {
        compression_threshold: None,
        ..ServerConfig::default()
    };
    let mut client = Client::with_config(config, ProtocolVersion::V765);
    let actions = client.login();

    assert_eq!(
        client.kinds::<lg::Clientbound>(&actions),
        vec![lg::ClientboundKind::LoginFinished]
    );
    assert!(!actions.iter().any(|a| matches!(a, Action::EnableCompression(_))));
}

#[test]
fn test_login_acknowledged_early_is_violation() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.hello("Steve");
    client.actions();
    client.feed(lg::Serverbound::LoginAcknowledged(LoginAcknowledged {}));
    let actions = client.actions();

    assert!(matches!(closed(&actions), Some(DisconnectReason::ProtocolViolation(_))));
    assert_eq!(
        client.kinds::<lg::Clientbound>(&actions),
        vec![lg::ClientboundKind::LoginDisconnect]
    );
    assert!(client.machine.is_closing());
}

#[test]
fn test_repeated_hello_is_violation() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.hello("Steve");
    client.actions();
    client.hello("Steve");

    assert!(matches!(
        closed(&client.actions()),
        Some(DisconnectReason::ProtocolViolation(_))
    ));
}

#[test]
fn test_authentication_failure_disconnects() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.hello("Steve");
    client.actions();
    client
        .machine
        .authenticated(Err(SessionError::AuthFailed("no session".into())));

    assert!(matches!(
        closed(&client.actions()),
        Some(DisconnectReason::Authentication(_))
    ));
}

#[test]
fn test_claim_conflict_disconnects_with_conflict() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.hello("Steve");
    client.actions();
    client
        .machine
        .authenticated(Ok(GameProfile::new(offline_uuid("Steve"), "Steve")));
    client.actions();
    client.machine.claimed(Err(SessionError::Conflict {
        name: "Steve".into(),
        uuid: offline_uuid("Steve"),
    }));

    assert_eq!(closed(&client.actions()), Some(&DisconnectReason::Conflict));
}

#[test]
fn test_name_veto_disconnects_in_login() {
    let mut client =
        Client::with_plugins(bus(Bouncer, Registration::new()), ProtocolVersion::V765);
    client.hello("Herobrine");
    let actions = client.actions();

    assert_eq!(
        closed(&actions),
        Some(&DisconnectReason::Vetoed(Text::plain("not welcome")))
    );
    assert!(!actions.iter().any(|a| matches!(a, Action::Authenticate { .. })));
}

#[test]
fn test_online_login_encrypts_then_authenticates() {
    let config = ServerConfig {
        online_mode: true,
        ..ServerConfig::default()
    };
    let services = Services::new(config).with_server_key(Arc::new(PlainKey));
    let mut client = Client::new(services, ProtocolVersion::V766);
    client.hello("Steve");
    let actions = client.actions();
    let request = match client.sent::<lg::Clientbound>(&actions).remove(0) {
        lg::Clientbound::EncryptionRequest(request) => request,
        other => panic!("expected encryption request, got {other:?}"),
    };
    assert_eq!(request.public_key, b"test-key".to_vec());
    assert_eq!(request.verify_token.len(), 4);

    let secret = vec![7u8; 16];
    client.feed(lg::Serverbound::Key(Key {
        shared_secret: secret.clone(),
        verify_token: request.verify_token,
    }));

    assert_eq!(
        client.actions(),
        vec![
            Action::EnableEncryption(secret.clone()),
            Action::Authenticate {
                name: "Steve".into(),
                server_hash: cobble_session::server_hash("", &secret, b"test-key"),
                online_mode: true,
            },
        ]
    );
}

#[test]
fn test_online_login_wrong_verify_token_disconnects() {
    let config = ServerConfig {
        online_mode: true,
        ..ServerConfig::default()
    };
    let services = Services::new(config).with_server_key(Arc::new(PlainKey));
    let mut client = Client::new(services, ProtocolVersion::V765);
    client.hello("Steve");
    let actions = client.actions();
    let lg::Clientbound::EncryptionRequest(request) =
        client.sent::<lg::Clientbound>(&actions).remove(0)
    else {
        panic!("expected encryption request");
    };
    let wrong: Vec<u8> = request.verify_token.iter().map(|b| b.wrapping_add(1)).collect();
    client.feed(lg::Serverbound::Key(Key {
        shared_secret: vec![7u8; 16],
        verify_token: wrong,
    }));

    let actions = client.actions();
    assert!(matches!(closed(&actions), Some(DisconnectReason::Authentication(_))));
    assert!(!actions.iter().any(|a| matches!(a, Action::EnableEncryption(_))));
}

#[test]
fn test_online_login_acknowledged_enters_configuration_once() {
    let inits = Arc::new(AtomicUsize::new(0));
    let config = ServerConfig {
        online_mode: true,
        ..ServerConfig::default()
    };
    let services = Services::new(config)
        .with_server_key(Arc::new(PlainKey))
        .with_plugins(Arc::new(bus(
            Inits(Arc::clone(&inits)),
            Registration::new().stage(Stage::Configuration),
        )));
    let mut client = Client::new(services, ProtocolVersion::V766);
    client.hello("Steve");
    let actions = client.actions();
    let lg::Clientbound::EncryptionRequest(request) =
        client.sent::<lg::Clientbound>(&actions).remove(0)
    else {
        panic!("expected encryption request");
    };
    client.feed(lg::Serverbound::Key(Key {
        shared_secret: vec![3u8; 16],
        verify_token: request.verify_token,
    }));
    client.actions();
    client
        .machine
        .authenticated(Ok(GameProfile::new(Uuid::new_v4(), "Steve")));
    client.actions();
    client.machine.claimed(Ok(()));
    client.actions();
    assert_eq!(inits.load(Ordering::SeqCst), 0);

    client.acknowledge_login();
    assert_eq!(client.machine.stage(), Stage::Configuration);
    assert_eq!(inits.load(Ordering::SeqCst), 1);

    client.select_known_packs();
    assert_eq!(inits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_login_query_withholds_login_finished_until_answered() {
    let answers = Arc::new(Mutex::new(Vec::new()));
    let querier = Querier {
        answers: Arc::clone(&answers),
    };
    let mut client = Client::with_plugins(
        bus(querier, Registration::new().stage(Stage::Login).channel(channel("query"))),
        ProtocolVersion::V765,
    );
    let actions = client.login();

    let sent = client.sent::<lg::Clientbound>(&actions);
    assert_eq!(
        sent.iter().map(PacketSet::kind).collect::<Vec<_>>(),
        vec![lg::ClientboundKind::LoginCompression, lg::ClientboundKind::CustomQuery]
    );
    let lg::Clientbound::CustomQuery(query) = &sent[1] else {
        panic!("expected custom query");
    };
    assert_eq!(query.transaction_id, VarInt(0));
    assert_eq!(query.channel, channel("query"));
    assert_eq!(query.data.0, vec![1, 2, 3]);

    client.feed(lg::Serverbound::CustomQueryAnswer(CustomQueryAnswer {
        transaction_id: VarInt(0),
        payload: Some(TrailingBytes::new(vec![9])),
    }));
    let actions = client.actions();

    assert_eq!(*answers.lock().unwrap(), vec![Some(vec![9])]);
    assert_eq!(
        client.kinds::<lg::Clientbound>(&actions),
        vec![lg::ClientboundKind::LoginFinished]
    );
}

#[test]
fn test_unknown_query_answer_is_ignored() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.login();
    client.feed(lg::Serverbound::CustomQueryAnswer(CustomQueryAnswer {
        transaction_id: VarInt(42),
        payload: None,
    }));

    assert!(client.actions().is_empty());
    assert!(!client.machine.is_closing());
}

#[test]
fn test_maintain_login_past_deadline_times_out() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.hello("Steve");
    client.actions();
    client.machine.maintain(client.now + Duration::from_secs(29));
    assert!(client.actions().is_empty());

    client.machine.maintain(client.now + Duration::from_secs(30));
    let actions = client.actions();
    assert_eq!(closed(&actions), Some(&DisconnectReason::Timeout));
    assert_eq!(
        client.kinds::<lg::Clientbound>(&actions),
        vec![lg::ClientboundKind::LoginDisconnect]
    );
}

#[test]
fn test_undecodable_frame_disconnects() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.machine.handle_frame(&[0x7f, 0x01], client.now);

    assert!(matches!(closed(&client.actions()), Some(DisconnectReason::Decode(_))));
}

#[test]
fn test_play_packet_during_configuration_disconnects() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.login();
    client.acknowledge_login();
    assert_eq!(client.machine.stage(), Stage::Configuration);

    client.feed(play::Serverbound::PingRequest(PingRequest { payload: 9 }));
    let actions = client.actions();

    let Some(DisconnectReason::Decode(message)) = closed(&actions) else {
        panic!("expected a decode disconnect, got {actions:?}");
    };
    assert!(message.contains("0x1e"), "{message}");
    assert_eq!(
        client.kinds::<cfg::Clientbound>(&actions),
        vec![cfg::ClientboundKind::Disconnect]
    );
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn test_configuration_765_sends_content_and_finishes() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.login();
    let actions = client.acknowledge_login();

    assert_eq!(client.machine.stage(), Stage::Configuration);
    assert_eq!(
        client.kinds::<cfg::Clientbound>(&actions),
        vec![
            cfg::ClientboundKind::CustomPayload,
            cfg::ClientboundKind::UpdateEnabledFeatures,
            cfg::ClientboundKind::RegistryData,
            cfg::ClientboundKind::UpdateTags,
            cfg::ClientboundKind::Ping,
            cfg::ClientboundKind::FinishConfiguration,
        ]
    );
}

#[test]
fn test_configuration_brand_payload_carries_server_brand() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.login();
    let actions = client.acknowledge_login();
    let cfg::Clientbound::CustomPayload(payload) =
        client.sent::<cfg::Clientbound>(&actions).remove(0)
    else {
        panic!("expected brand payload");
    };

    assert_eq!(payload.channel, Ident::vanilla("brand").unwrap());
    let expected = encode_to_vec(&Str::from("cobble"), ProtocolVersion::V765).unwrap();
    assert_eq!(payload.data.0, expected);
}

#[test]
fn test_configuration_766_waits_for_known_packs() {
    let mut client = Client::offline(ProtocolVersion::V766);
    client.login();
    let actions = client.acknowledge_login();

    let kinds = client.kinds::<cfg::Clientbound>(&actions);
    assert!(kinds.contains(&cfg::ClientboundKind::SelectKnownPacks));
    assert!(!kinds.contains(&cfg::ClientboundKind::RegistryData));
    assert!(!kinds.contains(&cfg::ClientboundKind::FinishConfiguration));

    let actions = client.select_known_packs();
    let kinds = client.kinds::<cfg::Clientbound>(&actions);
    assert!(kinds.len() > 2);
    assert!(kinds[..kinds.len() - 2]
        .iter()
        .all(|k| *k == cfg::ClientboundKind::RegistryData));
    assert_eq!(
        kinds[kinds.len() - 2..],
        [cfg::ClientboundKind::UpdateTags, cfg::ClientboundKind::FinishConfiguration]
    );
}

#[test]
fn test_maintain_after_finish_sent_stays_silent() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.login();
    let actions = client.acknowledge_login();
    assert!(
        client
            .kinds::<cfg::Clientbound>(&actions)
            .contains(&cfg::ClientboundKind::FinishConfiguration)
    );

    client.machine.maintain(client.now + Duration::from_secs(15));
    client.machine.maintain(client.now + Duration::from_secs(60));
    assert!(client.actions().is_empty());
    assert!(!client.machine.is_closing());
}

#[test]
fn test_configuration_keepalive_waits_one_interval() {
    let mut client = Client::offline(ProtocolVersion::V766);
    client.login();
    client.acknowledge_login();

    client.machine.maintain(client.now);
    assert!(client.actions().is_empty());

    client.machine.maintain(client.now + Duration::from_secs(15));
    let actions = client.actions();
    assert_eq!(
        client.kinds::<cfg::Clientbound>(&actions),
        vec![cfg::ClientboundKind::KeepAlive]
    );
}

#[test]
fn test_finish_configuration_before_server_is_violation() {
    let mut client = Client::offline(ProtocolVersion::V766);
    client.login();
    client.acknowledge_login();
    let actions = client.finish_configuration();

    assert!(matches!(closed(&actions), Some(DisconnectReason::ProtocolViolation(_))));
    assert_eq!(
        client.kinds::<cfg::Clientbound>(&actions),
        vec![cfg::ClientboundKind::Disconnect]
    );
}

#[test]
fn test_unsolicited_known_packs_are_ignored() {
    let mut client = Client::offline(ProtocolVersion::V766);
    client.login();
    client.acknowledge_login();
    client.select_known_packs();
    let actions = client.select_known_packs();

    assert!(actions.is_empty());
    assert!(!client.machine.is_closing());
}

fn required_pack() -> ServerConfig {
    ServerConfig {
        resource_pack: Some(ResourcePackConfig {
            url: "https://example.com/pack.zip".into(),
            hash: String::new(),
            required: true,
            prompt: None,
        }),
        ..ServerConfig::default()
    }
}

fn pack_response(id: Uuid, action: ResourcePackAction) -> cfg::Serverbound {
    cfg::Serverbound::ResourcePack(ResourcePackResponse { id, action })
}

#[test]
fn test_required_pack_withholds_finish_until_loaded() {
    let mut client = Client::with_config(required_pack(), ProtocolVersion::V765);
    client.login();
    let actions = client.acknowledge_login();
    let sent = client.sent::<cfg::Clientbound>(&actions);
    let push = sent
        .iter()
        .find_map(|p| match p {
            cfg::Clientbound::ResourcePackPush(push) => Some(push.clone()),
            _ => None,
        })
        .expect("pack pushed");
    assert!(push.required);
    assert_eq!(
        push.id,
        Uuid::new_v3(&Uuid::NAMESPACE_URL, b"https://example.com/pack.zip")
    );
    assert!(!sent
        .iter()
        .any(|p| matches!(p, cfg::Clientbound::FinishConfiguration(_))));

    client.feed(pack_response(push.id, ResourcePackAction::Accepted));
    assert!(client.actions().is_empty());

    client.feed(pack_response(push.id, ResourcePackAction::SuccessfullyLoaded));
    let actions = client.actions();
    assert_eq!(
        client.kinds::<cfg::Clientbound>(&actions),
        vec![cfg::ClientboundKind::FinishConfiguration]
    );
}

#[test]
fn test_required_pack_declined_disconnects() {
    let mut client = Client::with_config(required_pack(), ProtocolVersion::V765);
    client.login();
    client.acknowledge_login();
    let id = Uuid::new_v3(&Uuid::NAMESPACE_URL, b"https://example.com/pack.zip");
    client.feed(pack_response(id, ResourcePackAction::Declined));

    assert_eq!(
        closed(&client.actions()),
        Some(&DisconnectReason::ResourcePackRejected)
    );
}

#[test]
fn test_client_brand_is_recorded() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.login();
    client.acknowledge_login();
    let brand = encode_to_vec(&Str::from("vanilla"), ProtocolVersion::V765).unwrap();
    client.feed(cfg::Serverbound::CustomPayload(ServerboundCustomPayload {
        channel: Ident::vanilla("brand").unwrap(),
        data: TrailingBytes::new(brand),
    }));

    assert_eq!(client.machine.data().brand.as_deref(), Some("vanilla"));
}

// ---------------------------------------------------------------------------
// Play
// ---------------------------------------------------------------------------

#[test]
fn test_join_sends_login_then_spawn_bundle() {
    let mut client = Client::offline(ProtocolVersion::V765);
    let actions = client.join();

    assert_eq!(client.machine.stage(), Stage::Play);
    assert_eq!(
        client.kinds::<play::Clientbound>(&actions),
        vec![
            play::ClientboundKind::Login,
            play::ClientboundKind::BundleDelimiter,
            play::ClientboundKind::SetDefaultSpawnPosition,
            play::ClientboundKind::PlayerPosition,
            play::ClientboundKind::GameEvent,
            play::ClientboundKind::SetChunkCacheCenter,
            play::ClientboundKind::BundleDelimiter,
        ]
    );
}

#[test]
fn test_join_766_refers_to_dimension_type_by_id() {
    let mut client = Client::offline(ProtocolVersion::V766);
    let actions = client.join();
    let play::Clientbound::Login(login) = client.sent::<play::Clientbound>(&actions).remove(0)
    else {
        panic!("expected login");
    };

    assert!(matches!(
        login.spawn.dimension_type,
        play::clientbound::DimensionType::Id(_)
    ));
}

#[test]
fn test_join_outbound_filter_drops_bundle_member() {
    let mut client = Client::with_plugins(bus(Pinger, Registration::new()), ProtocolVersion::V765);
    let actions = client.join();
    let kinds = client.kinds::<play::Clientbound>(&actions);

    assert!(!kinds.contains(&play::ClientboundKind::GameEvent));
    assert!(kinds.contains(&play::ClientboundKind::PlayerPosition));
}

#[test]
fn test_teleport_mismatch_is_ignored() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.join();
    let expected = client.machine.data().pending_teleport.expect("teleport pending");

    client.feed(play::Serverbound::AcceptTeleportation(AcceptTeleportation {
        teleport_id: VarInt(expected.wrapping_add(1)),
    }));
    assert!(client.actions().is_empty());
    assert_eq!(client.machine.data().pending_teleport, Some(expected));

    client.feed(play::Serverbound::AcceptTeleportation(AcceptTeleportation {
        teleport_id: VarInt(expected),
    }));
    assert_eq!(client.machine.data().pending_teleport, None);
}

#[test]
fn test_keepalive_mismatch_is_ignored() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.join();
    client.machine.maintain(client.now + Duration::from_secs(15));
    let actions = client.actions();
    let play::Clientbound::KeepAlive(keepalive) =
        client.sent::<play::Clientbound>(&actions).remove(0)
    else {
        panic!("expected keep-alive");
    };

    client.feed(play::Serverbound::KeepAlive(KeepAlive {
        id: keepalive.id.wrapping_add(1),
    }));
    assert!(client.actions().is_empty());
    assert!(!client.machine.is_closing());

    client.feed(play::Serverbound::KeepAlive(keepalive));
    assert!(client.machine.data().keepalive.pending.is_none());
    assert!(client.machine.data().keepalive.latency_ms.is_some());
}

#[test]
fn test_keepalive_unanswered_times_out() {
    let config = ServerConfig {
        max_missed_keepalives: 1,
        ..ServerConfig::default()
    };
    let mut client = Client::with_config(config, ProtocolVersion::V765);
    client.join();
    client.machine.maintain(client.now);
    assert!(client.actions().is_empty());

    let start = client.now + Duration::from_secs(15);
    client.machine.maintain(start);
    let actions = client.actions();
    assert_eq!(
        client.kinds::<play::Clientbound>(&actions),
        vec![play::ClientboundKind::KeepAlive]
    );

    client.machine.maintain(start + Duration::from_secs(15));
    assert!(client.actions().is_empty());

    client.machine.maintain(start + Duration::from_secs(30));
    let actions = client.actions();
    assert_eq!(closed(&actions), Some(&DisconnectReason::Timeout));
    assert_eq!(
        client.kinds::<play::Clientbound>(&actions),
        vec![play::ClientboundKind::Disconnect]
    );
}

#[test]
fn test_chat_without_plugin_sends_nothing_back() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.join();
    client.feed(play::Serverbound::ChatMessage(ChatMessage {
        message: "hello".into(),
        timestamp: 0,
        salt: 0,
        signature: None,
        last_seen: last_seen(),
    }));

    assert!(client.actions().is_empty());
}

#[test]
fn test_unknown_command_gets_red_reply() {
    let mut client = Client::offline(ProtocolVersion::V766);
    client.join();
    client.feed(play::Serverbound::ChatCommand(ChatCommand {
        command: "warp home".into(),
    }));
    let actions = client.actions();
    let play::Clientbound::SystemChat(chat) = client.sent::<play::Clientbound>(&actions).remove(0)
    else {
        panic!("expected system chat");
    };

    assert_eq!(chat.content.to_plain(), "Unknown command: /warp home");
    assert_eq!(chat.content, Text::plain("Unknown command: /warp home").color("red"));
    assert!(!chat.overlay);
}

#[test]
fn test_plugin_command_reply_replaces_default() {
    let mut client = Client::with_plugins(bus(Pinger, Registration::new()), ProtocolVersion::V766);
    client.join();
    client.feed(play::Serverbound::ChatCommand(ChatCommand {
        command: "ping".into(),
    }));
    let actions = client.actions();
    let sent = client.sent::<play::Clientbound>(&actions);

    assert_eq!(sent.len(), 1);
    let play::Clientbound::SystemChat(chat) = &sent[0] else {
        panic!("expected system chat");
    };
    assert_eq!(chat.content, Text::plain("pong"));
}

#[test]
fn test_ping_request_answers_with_same_payload() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.join();
    client.feed(play::Serverbound::PingRequest(PingRequest { payload: 1234 }));
    let actions = client.actions();

    match client.sent::<play::Clientbound>(&actions).remove(0) {
        play::Clientbound::PongResponse(pong) => assert_eq!(pong.payload, 1234),
        other => panic!("expected pong, got {other:?}"),
    }
}

#[test]
fn test_reconfiguration_round_trip() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.join();

    assert!(client.machine.request_reconfiguration());
    assert!(!client.machine.request_reconfiguration());
    let actions = client.actions();
    assert_eq!(
        client.kinds::<play::Clientbound>(&actions),
        vec![play::ClientboundKind::StartConfiguration]
    );

    client.feed(play::Serverbound::ConfigurationAcknowledged(
        ConfigurationAcknowledged {},
    ));
    let actions = client.actions();
    assert_eq!(client.machine.stage(), Stage::Configuration);
    assert_eq!(
        client.kinds::<cfg::Clientbound>(&actions),
        vec![
            cfg::ClientboundKind::UpdateEnabledFeatures,
            cfg::ClientboundKind::RegistryData,
            cfg::ClientboundKind::UpdateTags,
            cfg::ClientboundKind::Ping,
            cfg::ClientboundKind::FinishConfiguration,
        ]
    );

    let actions = client.finish_configuration();
    assert_eq!(client.machine.stage(), Stage::Play);
    assert_eq!(
        client.kinds::<play::Clientbound>(&actions)[0],
        play::ClientboundKind::Login
    );
}

#[test]
fn test_configuration_ack_without_request_is_violation() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.join();
    client.feed(play::Serverbound::ConfigurationAcknowledged(
        ConfigurationAcknowledged {},
    ));

    assert!(matches!(
        closed(&client.actions()),
        Some(DisconnectReason::ProtocolViolation(_))
    ));
}

#[test]
fn test_request_reconfiguration_outside_play_refused() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.login();

    assert!(!client.machine.request_reconfiguration());
    assert!(client.actions().is_empty());
}

// ---------------------------------------------------------------------------
// Control and teardown
// ---------------------------------------------------------------------------

#[test]
fn test_kick_in_play_sends_disconnect_then_close() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.join();
    client.machine.kick(Text::plain("bye"));
    let actions = client.actions();

    assert_eq!(actions.len(), 2);
    match client.sent::<play::Clientbound>(&actions).remove(0) {
        play::Clientbound::Disconnect(d) => assert_eq!(d.reason, Text::plain("bye")),
        other => panic!("expected disconnect, got {other:?}"),
    }
    assert_eq!(
        actions[1],
        Action::Close(DisconnectReason::Kicked(Text::plain("bye")))
    );
}

#[test]
fn test_input_after_close_is_ignored() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.join();
    client.machine.kick(Text::plain("bye"));
    client.actions();
    client.feed(play::Serverbound::PingRequest(PingRequest { payload: 1 }));
    client.machine.maintain(client.now);

    assert!(client.actions().is_empty());
}

#[test]
fn test_system_chat_outside_play_dropped() {
    let mut client = Client::offline(ProtocolVersion::V765);
    client.login();
    client.acknowledge_login();
    client.machine.system_chat(Text::plain("hi"));

    assert!(client.actions().is_empty());
}

#[test]
fn test_teardown_runs_once() {
    let count = Arc::new(AtomicUsize::new(0));
    let mut client = Client::with_plugins(
        bus(Teardowns(Arc::clone(&count)), Registration::new()),
        ProtocolVersion::V765,
    );
    client.login();
    client.machine.teardown("client closed the connection");
    client.machine.teardown("again");

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(client.machine.is_closing());
}

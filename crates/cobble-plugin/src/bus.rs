//! The plugin dispatch bus.
//!
//! Plugins are collected by a [`PluginBusBuilder`] during startup, then
//! frozen into a [`PluginBus`] shared by every connection. Ownership of
//! channels and cookie keys is checked once, when the bus is built.
//!
//! Every hook call is wrapped in `catch_unwind`. A hook that errors or
//! panics is logged and counts as having returned nothing.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use cobble_protocol::packets::common::ClientInformation;
use cobble_protocol::packets::play::serverbound::{CommandSuggestion, InteractAction};
use cobble_protocol::packets::play::{self, clientbound::CommandSuggestions};
use cobble_protocol::{GameProfile, Ident, ProtocolVersion, Stage, Text, VarInt};
use cobble_session::{ConflictPolicy, ConnectionData};

use crate::{
    CommandSuggester, Emit, HookContext, HookResponse, Plugin, PluginError, RegistrationError,
    Verdict,
};

const ALL_STAGES: [Stage; 3] = [Stage::Login, Stage::Configuration, Stage::Play];

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Where and in which order a plugin is consulted.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    /// Higher runs first. Equal priorities run in registration order.
    pub priority: i32,
    /// The stage the plugin is bound to, or every stage when `None`.
    pub stage: Option<Stage>,
    /// Custom payload channels the plugin owns.
    pub channels: Vec<Ident>,
    /// Cookie keys the plugin owns.
    pub cookies: Vec<Ident>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn channel(mut self, channel: Ident) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn cookie(mut self, key: Ident) -> Self {
        self.cookies.push(key);
        self
    }

    fn covers(&self, stage: Stage) -> bool {
        self.stage.is_none_or(|s| s == stage)
    }

    fn stages(&self) -> Vec<Stage> {
        match self.stage {
            Some(stage) => vec![stage],
            None => ALL_STAGES.to_vec(),
        }
    }
}

/// Identifies a registered plugin, for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginHandle(u64);

impl fmt::Display for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plugin-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Channel(Ident),
    Cookie(Ident),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(id) => write!(f, "channel {id}"),
            Self::Cookie(id) => write!(f, "cookie {id}"),
        }
    }
}

struct Entry {
    handle: PluginHandle,
    plugin: Arc<dyn Plugin>,
    registration: Registration,
}

/// The frozen dispatch table.
struct Table {
    /// Sorted by descending priority, then registration order.
    entries: Vec<Arc<Entry>>,
    owners: HashMap<(Stage, Key), Arc<Entry>>,
}

impl Table {
    fn build(mut entries: Vec<Arc<Entry>>) -> Result<Self, RegistrationError> {
        // Stable sort keeps registration order within a priority.
        entries.sort_by(|a, b| b.registration.priority.cmp(&a.registration.priority));

        let mut owners: HashMap<(Stage, Key), Arc<Entry>> = HashMap::new();
        for entry in &entries {
            let keys = entry
                .registration
                .channels
                .iter()
                .cloned()
                .map(Key::Channel)
                .chain(entry.registration.cookies.iter().cloned().map(Key::Cookie));
            for key in keys {
                for stage in entry.registration.stages() {
                    if let Some(first) = owners.get(&(stage, key.clone())) {
                        return Err(RegistrationError::DuplicateOwner {
                            stage,
                            key: key.to_string(),
                            first: first.plugin.name().to_owned(),
                            second: entry.plugin.name().to_owned(),
                        });
                    }
                    owners.insert((stage, key.clone()), Arc::clone(entry));
                }
            }
        }
        Ok(Self { entries, owners })
    }

    fn in_stage(&self, stage: Stage) -> impl Iterator<Item = &Arc<Entry>> + '_ {
        self.entries
            .iter()
            .filter(move |e| e.registration.covers(stage))
    }

    fn owner(&self, stage: Stage, key: Key) -> Option<&Arc<Entry>> {
        self.owners.get(&(stage, key))
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects plugins before the server starts.
#[derive(Default)]
pub struct PluginBusBuilder {
    entries: Vec<Arc<Entry>>,
    suggester: Option<Arc<dyn CommandSuggester>>,
    next_handle: u64,
}

impl PluginBusBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plugin. Conflicting key ownership is reported by
    /// [`build`](Self::build).
    pub fn register(
        &mut self,
        plugin: impl Plugin,
        registration: Registration,
    ) -> PluginHandle {
        self.register_shared(Arc::new(plugin), registration)
    }

    pub fn register_shared(
        &mut self,
        plugin: Arc<dyn Plugin>,
        registration: Registration,
    ) -> PluginHandle {
        self.next_handle += 1;
        let handle = PluginHandle(self.next_handle);
        tracing::debug!(%handle, plugin = plugin.name(), ?registration, "plugin registered");
        self.entries.push(Arc::new(Entry {
            handle,
            plugin,
            registration,
        }));
        handle
    }

    /// The collaborator that answers tab completion.
    pub fn suggester(&mut self, suggester: impl CommandSuggester) -> &mut Self {
        self.suggester = Some(Arc::new(suggester));
        self
    }

    pub fn build(self) -> Result<PluginBus, RegistrationError> {
        let table = Table::build(self.entries)?;
        tracing::info!(plugins = table.entries.len(), "plugin bus ready");
        Ok(PluginBus {
            table: RwLock::new(Arc::new(table)),
            suggester: self.suggester,
        })
    }
}

// ---------------------------------------------------------------------------
// PluginBus
// ---------------------------------------------------------------------------

/// Dispatches hooks to registered plugins.
///
/// Dispatch works on a snapshot of the table, so a plugin removed while a
/// connection is mid-dispatch finishes the current call.
pub struct PluginBus {
    table: RwLock<Arc<Table>>,
    suggester: Option<Arc<dyn CommandSuggester>>,
}

impl PluginBus {
    pub fn builder() -> PluginBusBuilder {
        PluginBusBuilder::new()
    }

    /// A bus with no plugins.
    pub fn empty() -> Self {
        Self {
            table: RwLock::new(Arc::new(Table {
                entries: Vec::new(),
                owners: HashMap::new(),
            })),
            suggester: None,
        }
    }

    fn snapshot(&self) -> Arc<Table> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*table)
    }

    pub fn len(&self) -> usize {
        self.snapshot().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes a plugin. Its channels and cookie keys become unowned.
    pub fn unregister(&self, handle: PluginHandle) -> Result<(), RegistrationError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if !table.entries.iter().any(|e| e.handle == handle) {
            return Err(RegistrationError::UnknownHandle(handle));
        }
        let remaining: Vec<Arc<Entry>> = table
            .entries
            .iter()
            .filter(|e| e.handle != handle)
            .cloned()
            .collect();
        *table = Arc::new(Table::build(remaining)?);
        tracing::info!(%handle, "plugin unregistered");
        Ok(())
    }

    // -- Lifecycle ---------------------------------------------------------

    /// Runs every `on_stage_init` for the context's stage.
    pub fn stage_init(&self, ctx: &mut HookContext<'_>) {
        let table = self.snapshot();
        for entry in table.in_stage(ctx.stage()) {
            guarded(entry, "on_stage_init", || entry.plugin.on_stage_init(ctx));
        }
    }

    /// Runs every `on_teardown` for `stage`.
    pub fn teardown(&self, stage: Stage, data: &ConnectionData) {
        let table = self.snapshot();
        for entry in table.in_stage(stage) {
            guarded(entry, "on_teardown", || entry.plugin.on_teardown(stage, data));
        }
    }

    // -- Login -------------------------------------------------------------

    /// The first denial in priority order, if any.
    pub fn allow_name(&self, name: &str, version: ProtocolVersion) -> Result<(), Text> {
        let table = self.snapshot();
        for entry in table.in_stage(Stage::Login) {
            if let Some(Verdict::Deny(reason)) =
                guarded(entry, "allow_name", || entry.plugin.allow_name(name, version))
            {
                tracing::info!(plugin = entry.plugin.name(), name, "login vetoed");
                return Err(reason);
            }
        }
        Ok(())
    }

    /// The first policy a plugin picks, or `default`.
    pub fn join_conflict(
        &self,
        newcomer: &GameProfile,
        existing: &[GameProfile],
        default: ConflictPolicy,
    ) -> ConflictPolicy {
        let table = self.snapshot();
        for entry in table.in_stage(Stage::Login) {
            if let Some(Some(policy)) = guarded(entry, "on_join_conflict", || {
                entry.plugin.on_join_conflict(newcomer, existing)
            }) {
                tracing::debug!(plugin = entry.plugin.name(), ?policy, "join conflict overridden");
                return policy;
            }
        }
        default
    }

    /// Routes a login query answer to the owner of `channel`.
    pub fn login_query_answer(
        &self,
        ctx: &mut HookContext<'_>,
        channel: &Ident,
        payload: Option<&[u8]>,
    ) -> Option<Emit> {
        let table = self.snapshot();
        let entry = table.owner(Stage::Login, Key::Channel(channel.clone()))?;
        guarded(entry, "on_login_query_answer", || {
            entry.plugin.on_login_query_answer(ctx, channel, payload)
        })
        .and_then(|response| response.into_emit(channel))
    }

    // -- Channels ----------------------------------------------------------

    /// Whether some plugin owns `channel` in `stage`.
    pub fn owns_channel(&self, stage: Stage, channel: &Ident) -> bool {
        self.snapshot()
            .owner(stage, Key::Channel(channel.clone()))
            .is_some()
    }

    /// Routes a custom payload to the owner of its channel. Unowned
    /// channels are ignored.
    pub fn custom_payload(
        &self,
        ctx: &mut HookContext<'_>,
        channel: &Ident,
        data: &[u8],
    ) -> Option<Emit> {
        let table = self.snapshot();
        let Some(entry) = table.owner(ctx.stage(), Key::Channel(channel.clone())) else {
            tracing::debug!(%channel, stage = %ctx.stage(), "payload on unowned channel ignored");
            return None;
        };
        guarded(entry, "on_custom_payload", || {
            entry.plugin.on_custom_payload(ctx, channel, data)
        })
        .and_then(|response| response.into_emit(channel))
    }

    /// Routes a cookie to the owner of its key.
    pub fn cookie(
        &self,
        ctx: &mut HookContext<'_>,
        key: &Ident,
        payload: Option<&[u8]>,
    ) -> Option<Emit> {
        let table = self.snapshot();
        let Some(entry) = table.owner(ctx.stage(), Key::Cookie(key.clone())) else {
            tracing::debug!(%key, stage = %ctx.stage(), "cookie with no owner ignored");
            return None;
        };
        guarded(entry, "on_cookie", || entry.plugin.on_cookie(ctx, key, payload))
            .and_then(|response| response.into_emit(key))
    }

    // -- Configuration and play ---------------------------------------------

    pub fn client_information(&self, ctx: &mut HookContext<'_>, info: &ClientInformation) {
        let table = self.snapshot();
        for entry in table.in_stage(ctx.stage()) {
            guarded(entry, "on_client_information", || {
                entry.plugin.on_client_information(ctx, info)
            });
        }
    }

    /// Offers a chat message to plugins in priority order. The first
    /// response handles it.
    pub fn chat(&self, ctx: &mut HookContext<'_>, message: &str) -> Option<Emit> {
        let table = self.snapshot();
        first_response(&table, ctx, "on_chat", |plugin, ctx| plugin.on_chat(ctx, message))
    }

    /// Offers a command to plugins in priority order. The first response
    /// handles it.
    pub fn command(&self, ctx: &mut HookContext<'_>, command: &str) -> Option<Emit> {
        let table = self.snapshot();
        first_response(&table, ctx, "on_command", |plugin, ctx| {
            plugin.on_command(ctx, command)
        })
    }

    pub fn interact(
        &self,
        ctx: &mut HookContext<'_>,
        entity_id: i32,
        action: &InteractAction,
        sneaking: bool,
    ) {
        let table = self.snapshot();
        for entry in table.in_stage(Stage::Play) {
            guarded(entry, "on_interact", || {
                entry.plugin.on_interact(ctx, entity_id, action, sneaking)
            });
        }
    }

    pub fn packet(&self, ctx: &mut HookContext<'_>, packet: &play::Serverbound) {
        let table = self.snapshot();
        for entry in table.in_stage(Stage::Play) {
            guarded(entry, "on_packet", || entry.plugin.on_packet(ctx, packet));
        }
    }

    /// Whether every plugin lets `packet` through. A failing filter lets
    /// it through.
    pub fn allow_outbound(&self, data: &ConnectionData, packet: &play::Clientbound) -> bool {
        let table = self.snapshot();
        table.in_stage(Stage::Play).all(|entry| {
            guarded(entry, "filter_outbound", || {
                entry.plugin.filter_outbound(data, packet)
            })
            .unwrap_or(true)
        })
    }

    /// Filters a bundle member by member.
    pub fn filter_bundle(
        &self,
        data: &ConnectionData,
        packets: Vec<play::Clientbound>,
    ) -> Vec<play::Clientbound> {
        packets
            .into_iter()
            .filter(|p| self.allow_outbound(data, p))
            .collect()
    }

    /// Answers a tab completion request through the suggester, if one is
    /// configured and it has something to offer.
    pub fn suggest(
        &self,
        data: &ConnectionData,
        request: &CommandSuggestion,
    ) -> Option<play::Clientbound> {
        let suggester = self.suggester.as_ref()?;
        let command = request.command.as_str();
        let result = panic::catch_unwind(AssertUnwindSafe(|| suggester.suggest(data, command)));
        let suggestions = match result {
            Ok(suggestions) => suggestions?,
            Err(payload) => {
                tracing::warn!(panic = panic_message(payload.as_ref()), "command suggester panicked");
                return None;
            }
        };
        let (Ok(start), Ok(length)) = (
            i32::try_from(suggestions.start),
            i32::try_from(suggestions.length),
        ) else {
            tracing::warn!(
                start = suggestions.start,
                length = suggestions.length,
                "suggestion span out of range, not answered"
            );
            return None;
        };
        Some(play::Clientbound::CommandSuggestions(CommandSuggestions {
            transaction_id: request.transaction_id,
            start: VarInt(start),
            length: VarInt(length),
            matches: suggestions.matches,
        }))
    }
}

impl Default for PluginBus {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for PluginBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.snapshot();
        f.debug_struct("PluginBus")
            .field(
                "plugins",
                &table.entries.iter().map(|e| e.plugin.name()).collect::<Vec<_>>(),
            )
            .field("suggester", &self.suggester.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Dispatch helpers
// ---------------------------------------------------------------------------

/// Calls one hook, turning errors and panics into `None`.
fn guarded<T>(
    entry: &Entry,
    hook: &'static str,
    call: impl FnOnce() -> Result<T, PluginError>,
) -> Option<T> {
    let error = match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => return Some(value),
        Ok(Err(e)) => e,
        Err(payload) => PluginError::Panicked(panic_message(payload.as_ref())),
    };
    tracing::warn!(plugin = entry.plugin.name(), hook, error = %error, "plugin hook failed");
    None
}

fn first_response(
    table: &Table,
    ctx: &mut HookContext<'_>,
    hook: &'static str,
    call: impl Fn(&dyn Plugin, &mut HookContext<'_>) -> Result<HookResponse, PluginError>,
) -> Option<Emit> {
    for entry in table.in_stage(ctx.stage()) {
        let response = guarded(entry, hook, || call(entry.plugin.as_ref(), ctx))
            .unwrap_or_default();
        if response.is_none() {
            continue;
        }
        // Opaque chat and command answers go back on the plugin's first
        // channel; a plugin without one can only answer natively.
        let channel = entry.registration.channels.first();
        return match (response, channel) {
            (HookResponse::Native(packet), _) => Some(Emit::Packet(packet)),
            (response, Some(channel)) => response.into_emit(channel),
            (_, None) => {
                tracing::warn!(
                    plugin = entry.plugin.name(),
                    hook,
                    "opaque answer from a plugin without a channel dropped"
                );
                None
            }
        };
    }
    None
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl Plugin for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn id(s: &str) -> Ident {
        s.parse().unwrap()
    }

    #[test]
    fn test_build_duplicate_channel_same_stage_rejected() {
        let mut builder = PluginBus::builder();
        builder.register(
            Named("a"),
            Registration::new().stage(Stage::Play).channel(id("x:y")),
        );
        builder.register(
            Named("b"),
            Registration::new().stage(Stage::Play).channel(id("x:y")),
        );
        let err = builder.build().unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::DuplicateOwner { stage: Stage::Play, ref first, ref second, .. }
                if first == "a" && second == "b"
        ));
    }

    #[test]
    fn test_build_same_channel_different_stages_allowed() {
        let mut builder = PluginBus::builder();
        builder.register(
            Named("a"),
            Registration::new().stage(Stage::Configuration).channel(id("x:y")),
        );
        builder.register(
            Named("b"),
            Registration::new().stage(Stage::Play).channel(id("x:y")),
        );
        let bus = builder.build().unwrap();
        assert!(bus.owns_channel(Stage::Play, &id("x:y")));
        assert!(!bus.owns_channel(Stage::Login, &id("x:y")));
    }

    #[test]
    fn test_build_unbound_stage_claims_every_stage() {
        let mut builder = PluginBus::builder();
        builder.register(Named("a"), Registration::new().cookie(id("x:c")));
        builder.register(
            Named("b"),
            Registration::new().stage(Stage::Login).cookie(id("x:c")),
        );
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_channel_and_cookie_keys_do_not_collide() {
        let mut builder = PluginBus::builder();
        builder.register(Named("a"), Registration::new().channel(id("x:k")));
        builder.register(Named("b"), Registration::new().cookie(id("x:k")));
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_unregister_frees_channel() {
        let mut builder = PluginBus::builder();
        let handle = builder.register(Named("a"), Registration::new().channel(id("x:y")));
        let bus = builder.build().unwrap();
        assert!(bus.owns_channel(Stage::Play, &id("x:y")));

        bus.unregister(handle).unwrap();
        assert!(!bus.owns_channel(Stage::Play, &id("x:y")));
        assert!(bus.is_empty());
        assert!(matches!(
            bus.unregister(handle),
            Err(RegistrationError::UnknownHandle(h)) if h == handle
        ));
    }

    #[test]
    fn test_table_orders_by_priority_then_registration() {
        let mut builder = PluginBus::builder();
        builder.register(Named("low"), Registration::new().priority(-1));
        builder.register(Named("first"), Registration::new().priority(5));
        builder.register(Named("second"), Registration::new().priority(5));
        let bus = builder.build().unwrap();
        let names: Vec<String> = bus
            .snapshot()
            .entries
            .iter()
            .map(|e| e.plugin.name().to_owned())
            .collect();
        assert_eq!(names, ["first", "second", "low"]);
    }

    #[test]
    fn test_panic_message_extracts_strings() {
        let payload = panic::catch_unwind(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom 1");
    }
}

//! Plugin dispatch for Cobble.
//!
//! External handlers hook into a connection without the core knowing what
//! they do. They observe packets, veto logins, own custom payload channels
//! and cookie keys, and answer with native packets or opaque bytes.
//!
//! # Key types
//!
//! - [`Plugin`]: the hooks a handler implements
//! - [`PluginBusBuilder`] / [`PluginBus`]: registration and dispatch
//! - [`HookContext`]: the connection a hook runs for
//! - [`Notifier`]: cross-connection effects and async event listeners
//! - [`CommandSuggester`]: tab completion for the command channel

mod bus;
mod error;
mod notify;
mod plugin;
mod suggest;

pub use bus::{PluginBus, PluginBusBuilder, PluginHandle, Registration};
pub use error::{PluginError, RegistrationError};
pub use notify::{EventListener, Notifier, ProtocolEvent};
pub use plugin::{Emit, HookContext, HookResponse, Outgoing, Plugin, Verdict};
pub use suggest::{CommandSuggester, StaticSuggester, Suggestions};

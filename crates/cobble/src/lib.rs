//! # Cobble
//!
//! A versioned Minecraft protocol server for protocols 765 and 766.
//!
//! Cobble takes a client from the handshake through login and
//! configuration into play. Plugins hook into every stage; the world
//! itself is left to them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cobble::prelude::*;
//!
//! # async fn start() -> Result<(), CobbleError> {
//! let server = CobbleServer::builder()
//!     .bind("0.0.0.0:25565")
//!     .build(OfflineAuthenticator)
//!     .await?;
//! server.run().await
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod content;
mod error;
mod handler;
mod server;

pub use error::{CobbleError, DisconnectReason};
pub use handler::ServerShared;
pub use server::{CobbleServer, CobbleServerBuilder};

pub use cobble_plugin as plugin;
pub use cobble_protocol as protocol;
pub use cobble_session as session;
pub use cobble_transport as transport;

pub mod prelude {
    pub use crate::config::{GameMode, ResourcePackConfig, ServerConfig, WorldConfig};
    pub use crate::connection::{Action, ConnectionMachine, Services};
    pub use crate::content::{JoinContent, VanillaContent};
    pub use crate::{CobbleError, CobbleServer, CobbleServerBuilder, DisconnectReason};

    pub use cobble_plugin::{
        CommandSuggester, Emit, EventListener, HookContext, HookResponse, Notifier, Outgoing,
        Plugin, PluginBus, ProtocolEvent, Registration, StaticSuggester, Verdict,
    };
    pub use cobble_protocol::{GameProfile, Ident, ProtocolVersion, Stage, Text};
    pub use cobble_session::{
        Authenticator, ConflictPolicy, ConnectionData, OfflineAuthenticator, ServerKey,
        SessionConfig, SessionHandle,
    };
}

//! Player sessions for Cobble.
//!
//! This crate knows who is connected and how to reach them:
//!
//! 1. **Identity**: the [`Authenticator`] and [`ServerKey`] collaborators
//!    login consults, plus [`server_hash`] and [`offline_uuid`].
//! 2. **The connection record**: [`ConnectionData`], owned by the task
//!    that drives a connection.
//! 3. **Reaching other connections**: [`SessionHandle`] and the
//!    [`PlayerRegistry`] that resolves identity conflicts and fans
//!    broadcasts out.
//!
//! # How it fits in the stack
//!
//! ```text
//! Connection state machine (above)  ← consults auth, claims identities
//!     ↕
//! Session layer (this crate)        ← identities, records, registry
//!     ↕
//! Protocol layer (below)            ← GameProfile, Text
//! ```

mod auth;
mod error;
mod handle;
mod registry;
mod session;

pub use auth::{Authenticator, OfflineAuthenticator, ServerKey, offline_uuid, server_hash};
pub use error::SessionError;
pub use handle::{Control, ControlReceiver, SessionHandle};
pub use registry::PlayerRegistry;
pub use session::{
    ConflictPolicy, ConnectionData, KeepAliveTiming, PendingPack, SessionConfig,
};

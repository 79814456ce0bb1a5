//! Error types for the plugin layer.

use cobble_protocol::Stage;

use crate::PluginHandle;

/// A hook that did not complete.
///
/// Never reaches the connection: the bus logs it and carries on as if the
/// hook had returned no response.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The hook reported a failure.
    #[error("hook failed: {0}")]
    Failed(String),

    /// The hook panicked.
    #[error("hook panicked: {0}")]
    Panicked(String),
}

/// A problem with the set of registered plugins, found when the bus is
/// built or changed.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// Two plugins claim the same channel or cookie key in one stage.
    #[error("{key} in {stage} is claimed by both {first} and {second}")]
    DuplicateOwner {
        stage: Stage,
        key: String,
        first: String,
        second: String,
    },

    /// No plugin is registered under this handle.
    #[error("unknown plugin handle {0}")]
    UnknownHandle(PluginHandle),
}

//! The player registry: every logged-in session, keyed by connection.
//!
//! Shared by all connection tasks behind one mutex. The lock is only held
//! for table edits; anything that waits on another connection (kicks,
//! broadcasts) runs after it is released, through [`PlayerRegistry::accumulate`].

use std::collections::HashMap;
use std::future::Future;

use cobble_protocol::{GameProfile, Text};
use cobble_transport::ConnectionId;
use futures_util::future::join_all;
use tokio::sync::Mutex;

use crate::{ConflictPolicy, SessionConfig, SessionError, SessionHandle};

/// Tracks all logged-in sessions.
pub struct PlayerRegistry {
    sessions: Mutex<HashMap<ConnectionId, SessionHandle>>,
    config: SessionConfig,
}

impl PlayerRegistry {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Sessions that hold the same identity as `profile`.
    pub async fn conflicts(&self, profile: &GameProfile) -> Vec<SessionHandle> {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|h| h.matches(profile))
            .cloned()
            .collect()
    }

    /// Registers `handle`, resolving identity conflicts with `policy`.
    ///
    /// Under [`ConflictPolicy::KickExisting`] every matching session is
    /// removed and kicked with `reason`; this returns only after each kick
    /// was delivered or timed out. Returns how many sessions were kicked.
    pub async fn claim(
        &self,
        handle: SessionHandle,
        policy: ConflictPolicy,
        reason: Text,
    ) -> Result<usize, SessionError> {
        let displaced = {
            let mut sessions = self.sessions.lock().await;
            let matching: Vec<ConnectionId> = sessions
                .values()
                .filter(|h| h.id() != handle.id() && h.matches(handle.profile()))
                .map(SessionHandle::id)
                .collect();
            if !matching.is_empty() && policy == ConflictPolicy::RejectNew {
                return Err(SessionError::Conflict {
                    name: handle.profile().name.clone(),
                    uuid: handle.profile().uuid,
                });
            }
            let displaced: Vec<SessionHandle> = matching
                .iter()
                .filter_map(|id| sessions.remove(id))
                .collect();
            tracing::info!(
                id = %handle.id(),
                name = %handle.profile().name,
                displaced = displaced.len(),
                "session registered"
            );
            sessions.insert(handle.id(), handle);
            displaced
        };

        let kicked = displaced.len();
        let results = Self::accumulate(displaced, move |old| {
            let reason = reason.clone();
            async move {
                let id = old.id();
                if let Err(e) = old.kick(reason).await {
                    tracing::debug!(%id, error = %e, "displaced session did not confirm kick");
                }
            }
        })
        .await;
        debug_assert_eq!(results.len(), kicked);
        Ok(kicked)
    }

    /// Removes the session registered under `id`. Returns whether it was
    /// still registered (it may have been displaced already).
    pub async fn release(&self, id: ConnectionId) -> bool {
        let removed = self.sessions.lock().await.remove(&id).is_some();
        if removed {
            tracing::debug!(%id, "session released");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Snapshot of every registered handle.
    pub async fn handles(&self) -> Vec<SessionHandle> {
        self.sessions.lock().await.values().cloned().collect()
    }

    pub async fn find_by_name(&self, name: &str) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .await
            .values()
            .find(|h| h.profile().name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Runs `op` once per target, each in its own task, and waits for all
    /// of them.
    ///
    /// Each task works through the target's handle, so a target that
    /// disconnects midway only makes its own task fail.
    pub async fn accumulate<F, Fut, T>(targets: Vec<SessionHandle>, op: F) -> Vec<T>
    where
        F: Fn(SessionHandle) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let tasks: Vec<_> = targets.into_iter().map(|h| tokio::spawn(op(h))).collect();
        join_all(tasks)
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(error = %e, "fan-out task failed");
                    None
                }
            })
            .collect()
    }

    /// Shows `message` to every session. Returns how many confirmed it.
    pub async fn broadcast_chat(&self, message: Text) -> usize {
        let targets = self.handles().await;
        Self::accumulate(targets, move |h| {
            let message = message.clone();
            async move { h.send_system_chat(message).await.is_ok() }
        })
        .await
        .into_iter()
        .filter(|delivered| *delivered)
        .count()
    }

    /// Kicks every session whose name matches `name`, ignoring case.
    /// Returns how many confirmed.
    pub async fn kick_name(&self, name: &str, reason: Text) -> usize {
        let targets: Vec<SessionHandle> = self
            .handles()
            .await
            .into_iter()
            .filter(|h| h.profile().name.eq_ignore_ascii_case(name))
            .collect();
        Self::accumulate(targets, move |h| {
            let reason = reason.clone();
            async move { h.kick(reason).await.is_ok() }
        })
        .await
        .into_iter()
        .filter(|kicked| *kicked)
        .count()
    }
}

impl Default for PlayerRegistry {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

// =========================================================================
// Tests
// =========================================================================

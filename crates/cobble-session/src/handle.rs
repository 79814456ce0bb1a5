//! Cross-connection access to a live session.
//!
//! A [`SessionHandle`] never touches another connection's state directly.
//! It posts a [`Control`] request to the task that owns the connection and
//! waits until that task has acted on it. A handle whose connection has
//! gone away fails cleanly with [`SessionError::HandleClosed`] instead of
//! reaching freed state.

use std::time::Duration;

use cobble_protocol::{GameProfile, ProtocolVersion, Text};
use cobble_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot};

use crate::SessionError;

/// A request the owning connection task carries out on behalf of another.
///
/// The task completes `done` once the effect is on the wire.
#[derive(Debug)]
pub enum Control {
    /// Disconnect with `reason`, using the stage's own disconnect packet.
    Kick {
        reason: Text,
        done: oneshot::Sender<()>,
    },
    /// Show a system chat message.
    SystemChat {
        message: Text,
        done: oneshot::Sender<()>,
    },
    /// Send the player back to the configuration stage.
    Reconfigure { done: oneshot::Sender<()> },
}

/// The receiving end a connection task polls for [`Control`] requests.
pub type ControlReceiver = mpsc::UnboundedReceiver<Control>;

/// Cheap, cloneable reference to a logged-in connection.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: ConnectionId,
    profile: GameProfile,
    version: ProtocolVersion,
    control: mpsc::UnboundedSender<Control>,
    timeout: Duration,
}

impl SessionHandle {
    /// Creates a handle and the receiver its connection task must poll.
    pub fn new(
        id: ConnectionId,
        profile: GameProfile,
        version: ProtocolVersion,
        timeout: Duration,
    ) -> (Self, ControlReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            id,
            profile,
            version,
            control: tx,
            timeout,
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn profile(&self) -> &GameProfile {
        &self.profile
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Whether the connection task has stopped listening.
    pub fn is_closed(&self) -> bool {
        self.control.is_closed()
    }

    /// Whether `profile` names the same player: same UUID, or the same
    /// name ignoring ASCII case.
    pub fn matches(&self, profile: &GameProfile) -> bool {
        self.profile.uuid == profile.uuid || self.profile.name.eq_ignore_ascii_case(&profile.name)
    }

    /// Disconnects the session and waits until the disconnect was sent.
    pub async fn kick(&self, reason: Text) -> Result<(), SessionError> {
        self.request(|done| Control::Kick { reason, done }).await
    }

    pub async fn send_system_chat(&self, message: Text) -> Result<(), SessionError> {
        self.request(|done| Control::SystemChat { message, done })
            .await
    }

    pub async fn request_reconfiguration(&self) -> Result<(), SessionError> {
        self.request(|done| Control::Reconfigure { done }).await
    }

    async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<()>) -> Control,
    ) -> Result<(), SessionError> {
        let (done, acked) = oneshot::channel();
        self.control
            .send(make(done))
            .map_err(|_| SessionError::HandleClosed)?;
        match tokio::time::timeout(self.timeout, acked).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SessionError::HandleClosed),
            Err(_) => Err(SessionError::Unresponsive(self.timeout.as_millis() as u64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn handle(name: &str, uuid: u128) -> (SessionHandle, ControlReceiver) {
        SessionHandle::new(
            ConnectionId::new(uuid as u64),
            GameProfile::new(Uuid::from_u128(uuid), name),
            ProtocolVersion::V766,
            Duration::from_millis(500),
        )
    }

    #[test]
    fn test_matches_same_uuid_or_case_insensitive_name() {
        let (h, _rx) = handle("Steve", 1);
        assert!(h.matches(&GameProfile::new(Uuid::from_u128(1), "Other")));
        assert!(h.matches(&GameProfile::new(Uuid::from_u128(2), "sTEVE")));
        assert!(!h.matches(&GameProfile::new(Uuid::from_u128(2), "Alex")));
    }

    #[tokio::test]
    async fn test_kick_waits_for_acknowledgement() {
        let (h, mut rx) = handle("Steve", 1);
        let owner = tokio::spawn(async move {
            match rx.recv().await {
                Some(Control::Kick { reason, done }) => {
                    let _ = done.send(());
                    reason.to_plain()
                }
                other => panic!("unexpected control {other:?}"),
            }
        });
        h.kick(Text::plain("bye")).await.unwrap();
        assert_eq!(owner.await.unwrap(), "bye");
    }

    #[tokio::test]
    async fn test_kick_after_receiver_dropped_is_handle_closed() {
        let (h, rx) = handle("Steve", 1);
        drop(rx);
        assert!(h.is_closed());
        assert!(matches!(
            h.kick(Text::plain("bye")).await,
            Err(SessionError::HandleClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_without_ack_times_out() {
        let (h, _rx) = handle("Steve", 1);
        assert!(matches!(
            h.request_reconfiguration().await,
            Err(SessionError::Unresponsive(500))
        ));
    }
}

//! The async fire-and-notify path.
//!
//! Hooks run synchronously inside one connection's task and must not
//! reach into other connections. Instead they post to a [`Notifier`],
//! whose actor task runs cross-connection work through the
//! [`PlayerRegistry`] and hands protocol events to async listeners.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use cobble_protocol::{GameProfile, Stage, Text};
use cobble_session::PlayerRegistry;
use cobble_transport::ConnectionId;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Something that happened on a connection. Nobody waits for listeners to
/// handle it.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    StageEntered {
        id: ConnectionId,
        stage: Stage,
    },
    PlayerJoined {
        id: ConnectionId,
        profile: GameProfile,
    },
    PlayerLeft {
        id: ConnectionId,
        profile: Option<GameProfile>,
        stage: Stage,
        reason: String,
    },
    /// A keep-alive round trip completed.
    Latency {
        id: ConnectionId,
        latency_ms: u32,
    },
    /// An acknowledgement carried a stale id and was ignored.
    SequenceMismatch {
        id: ConnectionId,
        what: &'static str,
        expected: Option<i64>,
        received: i64,
    },
}

/// Receives [`ProtocolEvent`]s on the notifier's task.
pub trait EventListener: Send + Sync + 'static {
    fn on_event<'a>(&'a self, event: &'a ProtocolEvent) -> BoxFuture<'a, ()>;
}

#[derive(Debug)]
enum Notification {
    Event(ProtocolEvent),
    BroadcastChat(Text),
    Kick { name: String, reason: Text },
}

/// Posts work to the notifier task. Cheap to clone; posting never blocks.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    /// Starts the notifier task. It stops once every `Notifier` clone is
    /// dropped.
    pub fn spawn(
        registry: Arc<PlayerRegistry>,
        listeners: Vec<Arc<dyn EventListener>>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = NotifierActor {
            rx,
            registry,
            listeners,
        };
        (Self { tx }, tokio::spawn(actor.run()))
    }

    /// A notifier that discards everything.
    pub fn disabled() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }

    pub fn publish(&self, event: ProtocolEvent) {
        self.post(Notification::Event(event));
    }

    /// Shows `message` to every logged-in player.
    pub fn broadcast_chat(&self, message: Text) {
        self.post(Notification::BroadcastChat(message));
    }

    /// Kicks every session named `name`, ignoring case.
    pub fn kick(&self, name: impl Into<String>, reason: Text) {
        self.post(Notification::Kick {
            name: name.into(),
            reason,
        });
    }

    fn post(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::trace!("notifier stopped; notification dropped");
        }
    }
}

struct NotifierActor {
    rx: mpsc::UnboundedReceiver<Notification>,
    registry: Arc<PlayerRegistry>,
    listeners: Vec<Arc<dyn EventListener>>,
}

impl NotifierActor {
    async fn run(mut self) {
        tracing::debug!(listeners = self.listeners.len(), "notifier started");

        while let Some(notification) = self.rx.recv().await {
            match notification {
                Notification::Event(event) => self.deliver(&event).await,
                // Fan-outs get their own task so a slow target does not
                // hold up event delivery.
                Notification::BroadcastChat(message) => {
                    let registry = Arc::clone(&self.registry);
                    tokio::spawn(async move {
                        let delivered = registry.broadcast_chat(message).await;
                        tracing::debug!(delivered, "chat broadcast");
                    });
                }
                Notification::Kick { name, reason } => {
                    let registry = Arc::clone(&self.registry);
                    tokio::spawn(async move {
                        let kicked = registry.kick_name(&name, reason).await;
                        tracing::info!(%name, kicked, "kick by name");
                    });
                }
            }
        }

        tracing::debug!("notifier stopped");
    }

    async fn deliver(&self, event: &ProtocolEvent) {
        for listener in &self.listeners {
            if AssertUnwindSafe(listener.on_event(event))
                .catch_unwind()
                .await
                .is_err()
            {
                tracing::warn!(?event, "event listener panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cobble_protocol::ProtocolVersion;
    use cobble_session::{ConflictPolicy, Control, SessionHandle};
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProtocolEvent>>);

    impl EventListener for Recorder {
        fn on_event<'a>(&'a self, event: &'a ProtocolEvent) -> BoxFuture<'a, ()> {
            Box::pin(async move { self.0.lock().await.push(event.clone()) })
        }
    }

    struct Panicker;

    impl EventListener for Panicker {
        fn on_event<'a>(&'a self, _event: &'a ProtocolEvent) -> BoxFuture<'a, ()> {
            Box::pin(async { panic!("listener bug") })
        }
    }

    fn joined(id: u64) -> ProtocolEvent {
        ProtocolEvent::PlayerJoined {
            id: ConnectionId::new(id),
            profile: GameProfile::new(Uuid::from_u128(id.into()), "Steve"),
        }
    }

    #[tokio::test]
    async fn test_publish_delivers_in_order_despite_panicking_listener() {
        let recorder = Arc::new(Recorder::default());
        let (notifier, task) = Notifier::spawn(
            Arc::new(PlayerRegistry::default()),
            vec![Arc::new(Panicker), recorder.clone()],
        );
        notifier.publish(joined(1));
        notifier.publish(joined(2));
        drop(notifier);
        task.await.unwrap();

        assert_eq!(*recorder.0.lock().await, vec![joined(1), joined(2)]);
    }

    #[tokio::test]
    async fn test_broadcast_chat_reaches_registered_session() {
        let registry = Arc::new(PlayerRegistry::default());
        let (handle, mut control) = SessionHandle::new(
            ConnectionId::new(1),
            GameProfile::new(Uuid::from_u128(1), "Steve"),
            ProtocolVersion::V766,
            Duration::from_secs(1),
        );
        registry
            .claim(handle, ConflictPolicy::RejectNew, Text::plain("dup"))
            .await
            .unwrap();
        let (notifier, _task) = Notifier::spawn(registry, Vec::new());

        notifier.broadcast_chat(Text::plain("hello"));

        match control.recv().await {
            Some(Control::SystemChat { message, done }) => {
                assert_eq!(message.to_plain(), "hello");
                let _ = done.send(());
            }
            other => panic!("unexpected control {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_kick_by_name_reaches_session() {
        let registry = Arc::new(PlayerRegistry::default());
        let (handle, mut control) = SessionHandle::new(
            ConnectionId::new(1),
            GameProfile::new(Uuid::from_u128(1), "Steve"),
            ProtocolVersion::V765,
            Duration::from_secs(1),
        );
        registry
            .claim(handle, ConflictPolicy::RejectNew, Text::plain("dup"))
            .await
            .unwrap();
        let (notifier, _task) = Notifier::spawn(registry, Vec::new());

        notifier.kick("steve", Text::plain("bye"));

        assert!(matches!(control.recv().await, Some(Control::Kick { .. })));
    }

    #[test]
    fn test_disabled_notifier_drops_silently() {
        let notifier = Notifier::disabled();
        notifier.publish(joined(1));
        notifier.broadcast_chat(Text::plain("nobody"));
    }
}

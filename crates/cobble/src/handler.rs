//! Per-connection task: handshake, then the machine's input loop.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive the handshake and pick the protocol version
//!   2. Feed frames, maintenance ticks and control requests to the
//!      [`ConnectionMachine`]
//!   3. Carry out the actions it returns, in order
//!   4. Tear down: hooks, registry, socket

use std::sync::Arc;
use std::time::{Duration, Instant};

use cobble_protocol::packets::handshake::{Intent, Intention};
use cobble_protocol::packets::login::{Clientbound, LoginDisconnect};
use cobble_protocol::{GameProfile, ProtocolVersion, Text};
use cobble_session::{
    Authenticator, Control, ControlReceiver, PlayerRegistry, SessionError, SessionHandle,
};
use cobble_transport::{Connection, TransportError};
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;

use crate::connection::{Action, ConnectionMachine, Services};
use crate::error::DisconnectReason;
use crate::CobbleError;

/// State every connection task shares.
pub struct ServerShared<A: Authenticator> {
    pub services: Services,
    pub players: Arc<PlayerRegistry>,
    pub auth: A,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C, A>(
    conn: C,
    shared: Arc<ServerShared<A>>,
) -> Result<(), CobbleError>
where
    C: Connection<Error = TransportError>,
    A: Authenticator,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = ?conn.peer_addr(), "handling new connection");

    // --- Step 1: Handshake ---
    let Some((version, intent)) = perform_handshake(&conn, &shared).await? else {
        let _ = conn.close().await;
        return Ok(());
    };

    // --- Step 2: Machine loop ---
    let mut machine =
        ConnectionMachine::new(shared.services.clone(), conn_id, version, Instant::now());
    if intent == Intent::Transfer && !version.has_cookies() {
        machine.disconnect(DisconnectReason::ProtocolViolation(format!(
            "protocol {} does not accept transfers",
            version.number()
        )));
    }
    let outcome = run(&conn, &mut machine, &shared).await;

    // --- Step 3: Teardown, whatever ended the loop ---
    let reason = match &outcome {
        Ok(reason) => reason.clone(),
        Err(e) => e.to_string(),
    };
    machine.teardown(&reason);
    shared.players.release(conn_id).await;
    if let Err(e) = conn.close().await {
        tracing::trace!(%conn_id, error = %e, "close after teardown");
    }
    tracing::info!(%conn_id, reason = %reason, "connection closed");
    outcome.map(|_| ())
}

/// Reads the handshake. Returns `None` when the connection should close
/// without entering login.
async fn perform_handshake<C, A>(
    conn: &C,
    shared: &ServerShared<A>,
) -> Result<Option<(ProtocolVersion, Intent)>, CobbleError>
where
    C: Connection<Error = TransportError>,
    A: Authenticator,
{
    let conn_id = conn.id();
    let timeout = shared.services.config.handshake_timeout();
    let frame = match tokio::time::timeout(timeout, conn.recv()).await {
        Ok(Ok(Some(frame))) => frame,
        Ok(Ok(None)) => {
            tracing::debug!(%conn_id, "closed before handshake");
            return Ok(None);
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            tracing::debug!(%conn_id, "handshake timed out");
            return Ok(None);
        }
    };

    // No version is known yet, so a bad handshake gets no reply.
    let intention = match Intention::decode_frame(&frame) {
        Ok(intention) => intention,
        Err(e) => {
            tracing::debug!(%conn_id, error = %e, "bad handshake");
            return Ok(None);
        }
    };
    tracing::debug!(
        %conn_id,
        protocol = intention.protocol_version.0,
        address = %intention.server_address,
        port = intention.server_port,
        intent = ?intention.intent,
        "handshake"
    );

    if intention.intent == Intent::Status {
        tracing::debug!(%conn_id, "status requests are not served");
        return Ok(None);
    }

    let Some(version) = intention.version() else {
        let reason = DisconnectReason::UnsupportedVersion(intention.protocol_version.0);
        tracing::info!(%conn_id, %reason, "refusing login");
        let packet = Clientbound::LoginDisconnect(LoginDisconnect {
            reason: reason.message().into(),
        });
        let frame = shared.services.protocols.get(ProtocolVersion::LATEST).encode(&packet)?;
        conn.send(&frame).await?;
        return Ok(None);
    };
    Ok(Some((version, intention.intent)))
}

/// Runs until the machine closes or the client goes away. Returns why.
async fn run<C, A>(
    conn: &C,
    machine: &mut ConnectionMachine,
    shared: &ServerShared<A>,
) -> Result<String, CobbleError>
where
    C: Connection<Error = TransportError>,
    A: Authenticator,
{
    let mut control: Option<ControlReceiver> = None;
    let mut acks: Vec<oneshot::Sender<()>> = Vec::new();
    let mut ticker = tokio::time::interval(shared.services.config.maintenance_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let closed = perform_actions(conn, machine, shared, &mut control).await?;
        // Requests are confirmed only once their effect is on the wire.
        for done in acks.drain(..) {
            let _ = done.send(());
        }
        if let Some(reason) = closed {
            return Ok(reason.to_string());
        }

        tokio::select! {
            frame = conn.recv() => match frame? {
                Some(frame) => machine.handle_frame(&frame, Instant::now()),
                None => return Ok("client closed the connection".to_string()),
            },
            _ = ticker.tick() => machine.maintain(Instant::now()),
            request = next_control(&mut control) => match request {
                Some(request) => acks.push(apply_control(machine, request)),
                None => control = None,
            },
        }
    }
}

async fn next_control(control: &mut Option<ControlReceiver>) -> Option<Control> {
    match control {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn apply_control(machine: &mut ConnectionMachine, request: Control) -> oneshot::Sender<()> {
    match request {
        Control::Kick { reason, done } => {
            machine.kick(reason);
            done
        }
        Control::SystemChat { message, done } => {
            machine.system_chat(message);
            done
        }
        Control::Reconfigure { done } => {
            if !machine.request_reconfiguration() {
                tracing::debug!(conn_id = %machine.id(), stage = %machine.stage(), "reconfiguration not possible now");
            }
            done
        }
    }
}

/// Carries out queued actions in order. Returns the close reason once the
/// machine asks for the connection to close.
async fn perform_actions<C, A>(
    conn: &C,
    machine: &mut ConnectionMachine,
    shared: &ServerShared<A>,
    control: &mut Option<ControlReceiver>,
) -> Result<Option<DisconnectReason>, CobbleError>
where
    C: Connection<Error = TransportError>,
    A: Authenticator,
{
    while let Some(action) = machine.next_action() {
        match action {
            Action::Send(frame) => conn.send(&frame).await?,
            Action::EnableCompression(threshold) => conn.set_compression(Some(threshold)).await?,
            Action::EnableEncryption(secret) => conn.enable_encryption(&secret).await?,
            Action::Authenticate {
                name,
                server_hash,
                online_mode,
            } => {
                let result = shared.auth.verify(&name, &server_hash, online_mode).await;
                machine.authenticated(result);
            }
            Action::Claim(profile) => {
                let result = claim(shared, machine, profile).await.map(|rx| {
                    *control = Some(rx);
                });
                machine.claimed(result);
            }
            Action::Close(reason) => return Ok(Some(reason)),
        }
    }
    Ok(None)
}

/// Registers the player, settling identity conflicts first.
async fn claim<A: Authenticator>(
    shared: &ServerShared<A>,
    machine: &ConnectionMachine,
    profile: GameProfile,
) -> Result<ControlReceiver, SessionError> {
    let config = shared.players.config();
    let existing: Vec<GameProfile> = shared
        .players
        .conflicts(&profile)
        .await
        .iter()
        .map(|h| h.profile().clone())
        .collect();
    let policy = if existing.is_empty() {
        config.conflict_policy
    } else {
        shared
            .services
            .plugins
            .join_conflict(&profile, &existing, config.conflict_policy)
    };
    let (handle, rx) = SessionHandle::new(
        machine.id(),
        profile,
        machine.version(),
        Duration::from_millis(config.kick_timeout_ms),
    );
    let reason = Text::translate("multiplayer.disconnect.duplicate_login", Vec::new());
    let kicked = shared.players.claim(handle, policy, reason).await?;
    if kicked > 0 {
        tracing::info!(conn_id = %machine.id(), kicked, ?policy, "displaced existing sessions");
    }
    Ok(rx)
}

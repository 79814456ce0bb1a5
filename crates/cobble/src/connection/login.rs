//! Login: identity, encryption, compression and plugin queries.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use cobble_plugin::Emit;
use cobble_protocol::packets::common::CookieResponse;
use cobble_protocol::packets::login::{
    Clientbound, CustomQueryAnswer, EncryptionRequest, Hello, Key, LoginCompression,
    LoginFinished, Serverbound,
};
use cobble_protocol::{BoundedString, GameProfile, Ident, Stage, VarInt};
use cobble_session::{SessionError, server_hash};

use super::{Action, ConnectionMachine};
use crate::error::DisconnectReason;

/// Length of the AES key the client must choose.
const SHARED_SECRET_LEN: usize = 16;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
enum Phase {
    #[default]
    AwaitingHello,
    AwaitingKey {
        name: String,
        verify_token: [u8; 4],
    },
    Authenticating,
    Claiming,
    /// Identity settled; plugin queries may still be outstanding.
    Negotiating,
    AwaitingAck,
}

#[derive(Debug, Default)]
pub(super) struct LoginState {
    phase: Phase,
    next_transaction: i32,
    /// Open custom queries by transaction id.
    queries: HashMap<i32, Ident>,
    /// Cookie keys requested and not yet answered.
    cookies: HashSet<Ident>,
}

impl LoginState {
    pub(super) fn next_transaction(&mut self) -> i32 {
        let id = self.next_transaction;
        self.next_transaction = self.next_transaction.wrapping_add(1);
        id
    }
}

impl ConnectionMachine {
    pub(super) fn on_login(
        &mut self,
        packet: Serverbound,
        now: Instant,
    ) -> Result<(), DisconnectReason> {
        match packet {
            Serverbound::Hello(hello) => self.on_hello(hello),
            Serverbound::Key(key) => self.on_key(key),
            Serverbound::CustomQueryAnswer(answer) => {
                self.on_query_answer(answer);
                Ok(())
            }
            Serverbound::CookieResponse(cookie) => {
                self.on_login_cookie(cookie);
                Ok(())
            }
            Serverbound::LoginAcknowledged(_) => {
                if self.login.phase != Phase::AwaitingAck {
                    return Err(DisconnectReason::ProtocolViolation(
                        "login acknowledged before login finished".into(),
                    ));
                }
                self.enter(Stage::Configuration, now)
            }
        }
    }

    fn on_hello(&mut self, hello: Hello) -> Result<(), DisconnectReason> {
        if self.login.phase != Phase::AwaitingHello {
            return Err(DisconnectReason::ProtocolViolation("repeated login start".into()));
        }
        let name = hello.name.into_inner();
        tracing::info!(conn_id = %self.data.id, name = %name, client_uuid = %hello.uuid, "login start");
        self.services
            .plugins
            .allow_name(&name, self.data.version)
            .map_err(DisconnectReason::Vetoed)?;

        if !self.services.config.online_mode {
            self.login.phase = Phase::Authenticating;
            self.actions.push_back(Action::Authenticate {
                name,
                server_hash: String::new(),
                online_mode: false,
            });
            return Ok(());
        }

        let key = self
            .services
            .server_key
            .clone()
            .ok_or_else(|| DisconnectReason::Internal("online mode without a server key".into()))?;
        let verify_token: [u8; 4] = rand::random();
        self.send(Clientbound::EncryptionRequest(EncryptionRequest {
            server_id: BoundedString::from(""),
            public_key: key.public_key_der().to_vec(),
            verify_token: verify_token.to_vec(),
            should_authenticate: true,
        }));
        self.login.phase = Phase::AwaitingKey { name, verify_token };
        Ok(())
    }

    fn on_key(&mut self, key: Key) -> Result<(), DisconnectReason> {
        let Phase::AwaitingKey { name, verify_token } = self.login.phase.clone() else {
            return Err(DisconnectReason::ProtocolViolation(
                "encryption response without a request".into(),
            ));
        };
        let server_key = self
            .services
            .server_key
            .clone()
            .ok_or_else(|| DisconnectReason::Internal("online mode without a server key".into()))?;
        let auth_error = |e: SessionError| DisconnectReason::Authentication(e.to_string());

        let token = server_key.decrypt(&key.verify_token).map_err(auth_error)?;
        if token != verify_token {
            return Err(auth_error(SessionError::VerifyTokenMismatch));
        }
        let secret = server_key.decrypt(&key.shared_secret).map_err(auth_error)?;
        if secret.len() != SHARED_SECRET_LEN {
            return Err(auth_error(SessionError::KeyDecryption(format!(
                "shared secret is {} bytes",
                secret.len()
            ))));
        }

        let hash = server_hash("", &secret, server_key.public_key_der());
        self.actions.push_back(Action::EnableEncryption(secret));
        self.login.phase = Phase::Authenticating;
        self.actions.push_back(Action::Authenticate {
            name,
            server_hash: hash,
            online_mode: true,
        });
        Ok(())
    }

    /// Result of the [`Action::Authenticate`] the machine asked for.
    pub fn authenticated(&mut self, result: Result<GameProfile, SessionError>) {
        if self.closing {
            return;
        }
        if self.login.phase != Phase::Authenticating {
            tracing::warn!(conn_id = %self.data.id, "unexpected authentication result ignored");
            return;
        }
        match result {
            Ok(profile) => {
                tracing::info!(conn_id = %self.data.id, name = %profile.name, uuid = %profile.uuid, "authenticated");
                self.data.profile = Some(profile.clone());
                self.login.phase = Phase::Claiming;
                self.actions.push_back(Action::Claim(profile));
            }
            Err(e) => self.disconnect(DisconnectReason::Authentication(e.to_string())),
        }
    }

    /// Result of the [`Action::Claim`] the machine asked for.
    pub fn claimed(&mut self, result: Result<(), SessionError>) {
        if self.closing {
            return;
        }
        if self.login.phase != Phase::Claiming {
            tracing::warn!(conn_id = %self.data.id, "unexpected claim result ignored");
            return;
        }
        if let Err(e) = result {
            let reason = match e {
                SessionError::Conflict { .. } => DisconnectReason::Conflict,
                other => DisconnectReason::Internal(other.to_string()),
            };
            self.disconnect(reason);
            return;
        }

        if let Some(threshold) = self.services.config.compression_threshold {
            let Ok(wire_threshold) = i32::try_from(threshold) else {
                self.disconnect(DisconnectReason::Internal("compression threshold out of range".into()));
                return;
            };
            self.send(Clientbound::LoginCompression(LoginCompression {
                threshold: VarInt(wire_threshold),
            }));
            self.actions.push_back(Action::EnableCompression(threshold));
        }
        self.login.phase = Phase::Negotiating;
        self.run_hooks(|bus, ctx| bus.stage_init(ctx));
        self.idle();
    }

    pub(super) fn check_login_deadline(&mut self, now: Instant) -> Result<(), DisconnectReason> {
        if now.saturating_duration_since(self.started) >= self.services.config.login_timeout() {
            return Err(DisconnectReason::Timeout);
        }
        Ok(())
    }

    /// Sends the login success once every plugin query has its answer.
    pub(super) fn try_finish_login(&mut self) {
        if self.login.phase != Phase::Negotiating
            || !self.login.queries.is_empty()
            || !self.login.cookies.is_empty()
        {
            return;
        }
        let Some(profile) = self.data.profile.clone() else {
            self.disconnect(DisconnectReason::Internal("login finished without a profile".into()));
            return;
        };
        self.send(Clientbound::LoginFinished(LoginFinished {
            profile,
            strict_error_handling: false,
        }));
        self.login.phase = Phase::AwaitingAck;
    }

    pub(super) fn track_login(&mut self, packet: &Clientbound) {
        match packet {
            Clientbound::CustomQuery(query) => {
                self.login.queries.insert(query.transaction_id.0, query.channel.clone());
            }
            Clientbound::CookieRequest(request) => {
                self.login.cookies.insert(request.key.clone());
            }
            _ => {}
        }
    }

    fn on_query_answer(&mut self, answer: CustomQueryAnswer) {
        let transaction_id = answer.transaction_id.0;
        let Some(channel) = self.login.queries.remove(&transaction_id) else {
            let expected = self.login.queries.keys().min().copied().map(i64::from);
            self.mismatch("login_query", expected, i64::from(transaction_id));
            return;
        };
        let payload = answer.payload.as_ref().map(|p| p.0.as_slice());
        tracing::debug!(conn_id = %self.data.id, %channel, understood = payload.is_some(), "login query answered");
        let emit: Option<Emit> =
            self.run_hooks(|bus, ctx| bus.login_query_answer(ctx, &channel, payload));
        if let Some(emit) = emit {
            self.queue_emit(emit);
        }
    }

    fn on_login_cookie(&mut self, cookie: CookieResponse) {
        if !self.login.cookies.remove(&cookie.key) {
            tracing::warn!(conn_id = %self.data.id, key = %cookie.key, "unrequested cookie ignored");
            return;
        }
        self.on_cookie(cookie);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_transaction_counts_up() {
        let mut state = LoginState::default();
        assert_eq!(state.next_transaction(), 0);
        assert_eq!(state.next_transaction(), 1);
    }

    #[test]
    fn test_next_transaction_wraps() {
        let mut state = LoginState {
            next_transaction: i32::MAX,
            ..LoginState::default()
        };
        assert_eq!(state.next_transaction(), i32::MAX);
        assert_eq!(state.next_transaction(), i32::MIN);
    }
}

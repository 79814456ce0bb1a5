//! `CobbleServer` builder and server loop.
//!
//! This is the entry point for running a Cobble server. It ties together
//! all the layers: transport → protocol → session → plugins → the
//! per-connection machine.

use std::net::SocketAddr;
use std::sync::Arc;

use cobble_plugin::{EventListener, Notifier, PluginBus};
use cobble_session::{Authenticator, PlayerRegistry, ServerKey};
use cobble_transport::{CipherFactory, Connection, TcpTransport, Transport, TransportError};
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::connection::Services;
use crate::content::JoinContent;
use crate::handler::{ServerShared, handle_connection};
use crate::CobbleError;

/// Builder for configuring and starting a Cobble server.
///
/// # Example
///
/// ```rust,ignore
/// use cobble::prelude::*;
///
/// let server = CobbleServer::builder()
///     .bind("0.0.0.0:25565")
///     .build(OfflineAuthenticator)
///     .await?;
/// server.run().await
/// ```
pub struct CobbleServerBuilder {
    config: ServerConfig,
    plugins: Option<PluginBus>,
    listeners: Vec<Arc<dyn EventListener>>,
    server_key: Option<Arc<dyn ServerKey>>,
    content: Option<Arc<dyn JoinContent>>,
    ciphers: Option<Arc<dyn CipherFactory>>,
}

impl CobbleServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            plugins: None,
            listeners: Vec::new(),
            server_key: None,
            content: None,
            ciphers: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    /// Replaces the whole configuration, bind address included.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn online_mode(mut self, online: bool) -> Self {
        self.config.online_mode = online;
        self
    }

    /// Installs the plugins every connection dispatches to.
    pub fn plugins(mut self, plugins: PluginBus) -> Self {
        self.plugins = Some(plugins);
        self
    }

    /// Adds an async listener for protocol events.
    pub fn listener(mut self, listener: impl EventListener) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// The key pair for the online-mode encryption handshake.
    pub fn server_key(mut self, key: impl ServerKey) -> Self {
        self.server_key = Some(Arc::new(key));
        self
    }

    /// Replaces the registries, tags and packs sent during configuration.
    pub fn content(mut self, content: impl JoinContent) -> Self {
        self.content = Some(Arc::new(content));
        self
    }

    /// The stream cipher used once a client enables encryption.
    pub fn ciphers(mut self, factory: impl CipherFactory) -> Self {
        self.ciphers = Some(Arc::new(factory));
        self
    }

    /// Binds a TCP listener and builds the server.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<CobbleServer<A, TcpTransport>, CobbleError> {
        self.config.validate()?;
        let mut transport =
            TcpTransport::bind(&self.config.bind).await?.with_max_frame_len(self.config.max_frame_len);
        if let Some(ciphers) = &self.ciphers {
            transport = transport.with_ciphers(Arc::clone(ciphers));
        }
        self.build_with_transport(transport, auth)
    }

    /// Builds the server on an already bound transport.
    ///
    /// Must be called inside a Tokio runtime: the notifier task starts
    /// here.
    pub fn build_with_transport<A, T>(
        self,
        transport: T,
        auth: A,
    ) -> Result<CobbleServer<A, T>, CobbleError>
    where
        A: Authenticator,
        T: Transport<Error = TransportError>,
        T::Connection: Connection<Error = TransportError>,
    {
        self.config.validate()?;
        if self.config.online_mode && self.server_key.is_none() {
            return Err(CobbleError::Config("online mode needs a server key".into()));
        }

        let players = Arc::new(PlayerRegistry::new(self.config.session.clone()));
        let (notifier, notifier_task) = Notifier::spawn(Arc::clone(&players), self.listeners);

        let mut services = Services::new(self.config)
            .with_plugins(Arc::new(self.plugins.unwrap_or_else(PluginBus::empty)))
            .with_notifier(notifier);
        if let Some(content) = self.content {
            services = services.with_content(content);
        }
        if let Some(key) = self.server_key {
            services = services.with_server_key(key);
        }

        let shared = Arc::new(ServerShared {
            services,
            players,
            auth,
        });
        Ok(CobbleServer {
            transport,
            shared,
            notifier_task,
        })
    }
}

impl Default for CobbleServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Cobble server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct CobbleServer<A: Authenticator, T: Transport> {
    transport: T,
    shared: Arc<ServerShared<A>>,
    notifier_task: JoinHandle<()>,
}

impl CobbleServer<cobble_session::OfflineAuthenticator, TcpTransport> {
    /// Creates a new builder.
    pub fn builder() -> CobbleServerBuilder {
        CobbleServerBuilder::new()
    }
}

impl<A: Authenticator> CobbleServer<A, TcpTransport> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }
}

impl<A, T> CobbleServer<A, T>
where
    A: Authenticator,
    T: Transport<Error = TransportError>,
    T::Connection: Connection<Error = TransportError>,
{
    /// State shared with every connection: the player registry and the
    /// services.
    pub fn shared(&self) -> Arc<ServerShared<A>> {
        Arc::clone(&self.shared)
    }

    /// Runs the server accept loop.
    ///
    /// Spawns a handler task for each accepted connection. Returns once
    /// the transport shuts down.
    pub async fn run(mut self) -> Result<(), CobbleError> {
        tracing::info!(
            online_mode = self.shared.services.config.online_mode,
            "Cobble server running"
        );

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, shared).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(TransportError::Shutdown) => break,
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
        tracing::info!("accept loop stopped");
        self.notifier_task.abort();
        Ok(())
    }
}

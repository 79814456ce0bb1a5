//! Runs a Cobble server in offline mode.
//!
//! ```text
//! cobble-server [--config server.json] [--bind 0.0.0.0:25565]
//! ```
//!
//! Log verbosity follows `RUST_LOG` and defaults to `info`.

use cobble::prelude::*;
use tracing_subscriber::EnvFilter;

fn flag(name: &str) -> Option<String> {
    std::env::args().skip_while(|a| a != name).nth(1)
}

#[tokio::main]
async fn main() -> Result<(), CobbleError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = match flag("--config") {
        Some(path) => ServerConfig::load(&path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = flag("--bind") {
        config.bind = bind;
    }
    if config.online_mode {
        tracing::warn!("online mode needs a server key; this binary runs offline only");
        config.online_mode = false;
    }

    let server = CobbleServer::builder()
        .config(config)
        .plugins(PluginBus::builder().build()?)
        .build(OfflineAuthenticator)
        .await?;
    tracing::info!(addr = ?server.local_addr().ok(), "listening");
    server.run().await
}

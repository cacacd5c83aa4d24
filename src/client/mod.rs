//! Client module for Sockquic
//!
//! This module contains the local agent: the SOCKS5 listener and UDP relay,
//! and the tunnel client that carries their flows to the remote agent.

#[allow(clippy::module_inception)]
mod client;
mod tunnel;

pub use client::Client;
pub use tunnel::{Flow, TunnelClient};

use crate::config::Config;
use crate::transport::{QuicConnector, TlsProvider};
use anyhow::Result;
use tokio::sync::broadcast;
use tracing::info;

/// Run the client with the given configuration
///
/// Certificate material is loaded and both listeners are bound before the
/// first connection is accepted; the tunnel itself is dialed on first use.
pub async fn run_client(config: Config, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    let tls = TlsProvider::from_config(&config.tls)?;
    let server_addr = config.server_dial_addr();
    let connector = QuicConnector::new(&server_addr, &tls, &config.transport)?;

    info!("Tunnel server: {}", server_addr);

    let client = Client::bind(&config, connector).await?;
    client.run(shutdown_rx).await
}

//! Server module for Sockquic
//!
//! This module contains the remote agent, which terminates the tunnel and
//! dials the destinations clients declare.

mod tunnel;

pub use tunnel::{serve_connection, serve_flow, TunnelServer};

use crate::config::Config;
use crate::error::SockquicError;
use crate::transport::{QuicAcceptor, TlsProvider};
use anyhow::Result;
use tokio::sync::broadcast;

/// Run the server with the given configuration
pub async fn run_server(config: Config, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    let tls = TlsProvider::from_config(&config.tls)?;
    let bind_addr = config.server_bind_addr().map_err(SockquicError::Config)?;
    let acceptor = QuicAcceptor::bind(bind_addr, &tls, &config.transport)?;

    TunnelServer::new(acceptor, config.timeouts).run(shutdown_rx).await
}

//! Client agent
//!
//! Owns the local SOCKS5 listener and UDP relay and the tunnel client they
//! share.

use super::TunnelClient;
use crate::config::Config;
use crate::error::SockquicError;
use crate::socks::{handle_socks5, ProxyContext, UdpRelay};
use crate::transport::{SocketOpts, TunnelConnector};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Local agent: SOCKS5 on one side, the tunnel on the other
pub struct Client<C: TunnelConnector> {
    listener: TcpListener,
    relay: Arc<UdpRelay<C>>,
    context: Arc<ProxyContext<C>>,
}

impl<C: TunnelConnector> Client<C> {
    /// Bind the SOCKS5 listener and the UDP relay on the configured local
    /// address
    ///
    /// The UDP relay takes the same port as the TCP listener, so a port of 0
    /// in the config resolves to one ephemeral port for both.
    pub async fn bind(config: &Config, connector: C) -> Result<Self> {
        let local_addr = config.local_bind_addr().map_err(SockquicError::Config)?;

        let listener = TcpListener::bind(local_addr)
            .await
            .with_context(|| format!("Failed to bind SOCKS5 listener on {}", local_addr))?;
        let bound = listener.local_addr()?;

        let tunnel = Arc::new(TunnelClient::new(connector));
        let relay = Arc::new(
            UdpRelay::bind(bound, tunnel.clone(), config.timeouts.flow_idle()).await?,
        );

        let context = Arc::new(ProxyContext {
            tunnel,
            bypass_private: config.bypass_private,
            dial_timeout: config.timeouts.dial(),
            udp_relay_addr: relay.local_addr()?,
        });

        Ok(Client {
            listener,
            relay,
            context,
        })
    }

    /// Address of the SOCKS5 listener
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// The shared tunnel client
    pub fn tunnel(&self) -> &Arc<TunnelClient<C>> {
        &self.context.tunnel
    }

    /// Run the client until shutdown
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        info!("SOCKS5 proxy listening on {}", self.local_addr()?);
        if self.context.bypass_private {
            info!("Private addresses bypass the tunnel");
        }

        let relay = self.relay.clone();
        let relay_shutdown = shutdown_rx.resubscribe();
        let relay_task = tokio::spawn(async move {
            if let Err(e) = relay.run(relay_shutdown).await {
                error!("UDP relay error: {:#}", e);
            }
        });

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => self.spawn_connection(stream, peer),
                        Err(e) => warn!("Failed to accept SOCKS5 connection: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping client");
                    break;
                }
            }
        }

        relay_task.abort();
        info!("Client stopped");
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = SocketOpts::default().apply(&stream) {
            warn!("Failed to set socket options for {}: {}", peer, e);
        }

        let local_addr = match stream.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                warn!("Failed to get local address for {}: {}", peer, e);
                return;
            }
        };

        debug!("Accepted SOCKS5 connection from {}", peer);
        let context = self.context.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_socks5(stream, local_addr, context).await {
                debug!("SOCKS5 connection from {} ended: {:#}", peer, e);
            }
        });
    }
}

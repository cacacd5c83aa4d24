//! QUIC transport implementation
//!
//! One QUIC connection carries every flow between the two agents. Each flow
//! uses one unidirectional stream for its handshake and one bidirectional
//! stream for payload.

use super::{AddrMaybeCached, Connecting, TlsProvider, TunnelAcceptor, TunnelConnection, TunnelConnector};
use crate::config::TransportConfig;
use crate::error::SockquicError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use quinn::crypto::rustls::{QuicClientConfig, QuicServerConfig};
use quinn::{ConnectionError, Endpoint, IdleTimeout, VarInt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Application close code used when a connection is shut down cleanly
const CLOSE_CODE_NORMAL: u32 = 0;

/// Build the QUIC transport parameters shared by both agents
fn transport_config(config: &TransportConfig) -> Result<quinn::TransportConfig> {
    let mut transport = quinn::TransportConfig::default();

    let idle = IdleTimeout::try_from(Duration::from_secs(config.max_idle_secs))
        .with_context(|| format!("Invalid max_idle_secs: {}", config.max_idle_secs))?;
    transport
        .max_idle_timeout(Some(idle))
        .keep_alive_interval(Some(Duration::from_secs(config.keep_alive_secs)))
        .max_concurrent_bidi_streams(VarInt::from_u32(config.max_streams))
        .max_concurrent_uni_streams(VarInt::from_u32(config.max_streams));

    Ok(transport)
}

/// An established QUIC connection
#[derive(Debug, Clone)]
pub struct QuicConnection(quinn::Connection);

/// Map the errors that mean "the connection is gone" to `None`
fn closed_to_none<T>(result: Result<T, ConnectionError>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ConnectionError::ApplicationClosed(_))
        | Err(ConnectionError::ConnectionClosed(_))
        | Err(ConnectionError::LocallyClosed)
        | Err(ConnectionError::TimedOut)
        | Err(ConnectionError::Reset) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl TunnelConnection for QuicConnection {
    type SendStream = quinn::SendStream;
    type RecvStream = quinn::RecvStream;

    async fn open_uni(&self) -> Result<Self::SendStream> {
        self.0
            .open_uni()
            .await
            .with_context(|| "Failed to open unidirectional stream")
    }

    async fn open_bi(&self) -> Result<(Self::SendStream, Self::RecvStream)> {
        self.0
            .open_bi()
            .await
            .with_context(|| "Failed to open bidirectional stream")
    }

    async fn accept_uni(&self) -> Result<Option<Self::RecvStream>> {
        closed_to_none(self.0.accept_uni().await)
    }

    async fn accept_bi(&self) -> Result<Option<(Self::SendStream, Self::RecvStream)>> {
        closed_to_none(self.0.accept_bi().await)
    }

    fn remote_addr(&self) -> SocketAddr {
        self.0.remote_address()
    }

    fn is_closed(&self) -> bool {
        self.0.close_reason().is_some()
    }

    fn close(&self) {
        self.0.close(VarInt::from_u32(CLOSE_CODE_NORMAL), b"");
    }
}

/// Dials the remote agent over QUIC
pub struct QuicConnector {
    endpoint: Endpoint,
    server_addr: AddrMaybeCached,
    server_name: String,
    handshake_timeout: Duration,
}

impl QuicConnector {
    /// Bind a client endpoint for dialing `server_addr`
    ///
    /// The endpoint binds an ephemeral port on the unspecified address of the
    /// same family as `server_addr` (IPv4 unless it is a bracketed IPv6
    /// literal).
    pub fn new(
        server_addr: &str,
        tls: &TlsProvider,
        config: &TransportConfig,
    ) -> Result<Self> {
        let mut client_config = quinn::ClientConfig::new(Arc::new(
            QuicClientConfig::try_from(tls.client_config()?)
                .with_context(|| "TLS configuration is not usable for QUIC")?,
        ));
        client_config.transport_config(Arc::new(transport_config(config)?));

        let bind: SocketAddr = if server_addr.starts_with('[') {
            "[::]:0".parse()?
        } else {
            "0.0.0.0:0".parse()?
        };
        let mut endpoint = Endpoint::client(bind)
            .with_context(|| format!("Failed to bind QUIC client endpoint on {}", bind))?;
        endpoint.set_default_client_config(client_config);

        Ok(QuicConnector {
            endpoint,
            server_addr: AddrMaybeCached::new(server_addr),
            server_name: tls.server_name().to_string(),
            handshake_timeout: Duration::from_secs(config.handshake_idle_secs),
        })
    }
}

#[async_trait]
impl TunnelConnector for QuicConnector {
    type Connection = QuicConnection;

    async fn connect(&self) -> Result<Self::Connection> {
        let addr = self.server_addr.resolve().await?;

        let connecting = self.endpoint.connect(addr, &self.server_name).map_err(|e| {
            SockquicError::Transport(format!("failed to start connection to {}: {}", addr, e))
        })?;

        let result = tokio::time::timeout(self.handshake_timeout, connecting).await;
        let connection = match result {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                self.server_addr.clear_cache().await;
                return Err(SockquicError::Transport(format!(
                    "QUIC handshake with {} ({}) failed: {}",
                    self.server_addr.addr(),
                    addr,
                    e
                ))
                .into());
            }
            Err(_) => {
                self.server_addr.clear_cache().await;
                return Err(SockquicError::Timeout(format!(
                    "QUIC handshake with {} after {:?}",
                    addr, self.handshake_timeout
                ))
                .into());
            }
        };

        debug!("QUIC connection established to {}", addr);
        Ok(QuicConnection(connection))
    }
}

impl Drop for QuicConnector {
    fn drop(&mut self) {
        self.endpoint
            .close(VarInt::from_u32(CLOSE_CODE_NORMAL), b"client shutdown");
    }
}

/// Accepts QUIC connections from client agents
pub struct QuicAcceptor {
    endpoint: Endpoint,
    handshake_timeout: Duration,
}

impl QuicAcceptor {
    /// Bind a server endpoint on `addr`
    pub fn bind(addr: SocketAddr, tls: &TlsProvider, config: &TransportConfig) -> Result<Self> {
        let mut server_config = quinn::ServerConfig::with_crypto(Arc::new(
            QuicServerConfig::try_from(tls.server_config()?)
                .with_context(|| "TLS configuration is not usable for QUIC")?,
        ));
        server_config.transport_config(Arc::new(transport_config(config)?));

        let endpoint = Endpoint::server(server_config, addr)
            .with_context(|| format!("Failed to bind QUIC endpoint on {}", addr))?;

        Ok(QuicAcceptor {
            endpoint,
            handshake_timeout: Duration::from_secs(config.handshake_idle_secs),
        })
    }
}

#[async_trait]
impl TunnelAcceptor for QuicAcceptor {
    type Connection = QuicConnection;

    async fn accept(&self) -> Option<Connecting<Self::Connection>> {
        let incoming = self.endpoint.accept().await?;
        let timeout = self.handshake_timeout;

        Some(Box::pin(async move {
            let remote = incoming.remote_address();
            let connecting = incoming
                .accept()
                .with_context(|| format!("Failed to accept connection from {}", remote))?;
            let connection = tokio::time::timeout(timeout, connecting)
                .await
                .map_err(|_| SockquicError::Timeout(format!("QUIC handshake with {}", remote)))?
                .with_context(|| format!("QUIC handshake with {} failed", remote))?;
            Ok(QuicConnection(connection))
        }))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.endpoint.local_addr()?)
    }
}

impl Drop for QuicAcceptor {
    fn drop(&mut self) {
        self.endpoint
            .close(VarInt::from_u32(CLOSE_CODE_NORMAL), b"server shutdown");
    }
}

//! Transport module for Sockquic
//!
//! This module provides the multiplexed tunnel abstraction and its
//! implementations (QUIC for real deployments, in-process memory pipes for
//! tests and embedding).

mod addr;
pub mod memory;
mod quic;
mod tls;

pub use addr::AddrMaybeCached;
pub use memory::{MemoryAcceptor, MemoryConnection, MemoryConnector};
pub use quic::{QuicAcceptor, QuicConnection, QuicConnector};
pub use tls::TlsProvider;

use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Socket options for configuring TCP connections
#[derive(Debug, Clone)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: Some(20),
            keepalive_interval: Some(8),
        }
    }
}

impl SocketOpts {
    /// Options for connections carrying relayed payload
    pub fn for_flow() -> Self {
        SocketOpts::default()
    }

    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}

/// An established, authenticated connection carrying many independent
/// ordered byte streams
///
/// Handles are cheap to clone and all refer to the same connection.
#[async_trait]
pub trait TunnelConnection: Clone + Send + Sync + 'static {
    /// Sending half of a stream
    type SendStream: AsyncWrite + Unpin + Send + 'static;
    /// Receiving half of a stream
    type RecvStream: AsyncRead + Unpin + Send + 'static;

    /// Open a unidirectional stream towards the peer
    async fn open_uni(&self) -> Result<Self::SendStream>;

    /// Open a bidirectional stream
    async fn open_bi(&self) -> Result<(Self::SendStream, Self::RecvStream)>;

    /// Accept the next unidirectional stream opened by the peer.
    /// `None` once the connection is closed.
    async fn accept_uni(&self) -> Result<Option<Self::RecvStream>>;

    /// Accept the next bidirectional stream opened by the peer.
    /// `None` once the connection is closed.
    async fn accept_bi(&self) -> Result<Option<(Self::SendStream, Self::RecvStream)>>;

    /// Address of the peer
    fn remote_addr(&self) -> SocketAddr;

    /// Whether the connection has terminated for any reason
    fn is_closed(&self) -> bool;

    /// Close the connection and every stream on it
    fn close(&self);
}

/// Client side of a tunnel transport: dials the remote agent
#[async_trait]
pub trait TunnelConnector: Send + Sync + 'static {
    /// Connection type produced
    type Connection: TunnelConnection;

    /// Establish a new connection to the remote agent
    async fn connect(&self) -> Result<Self::Connection>;
}

/// A connection whose handshake is still in progress
pub type Connecting<C> = Pin<Box<dyn Future<Output = Result<C>> + Send>>;

/// Server side of a tunnel transport
#[async_trait]
pub trait TunnelAcceptor: Send + Sync + 'static {
    /// Connection type produced
    type Connection: TunnelConnection;

    /// Wait for the next incoming connection. The handshake is returned as a
    /// future so the accept loop never waits on a single slow peer.
    /// `None` once the acceptor is shut down.
    async fn accept(&self) -> Option<Connecting<Self::Connection>>;

    /// Address the acceptor is bound to
    fn local_addr(&self) -> Result<SocketAddr>;
}

//! Tunnel server
//!
//! Accepts tunnel connections and turns each (handshake, payload stream)
//! pair into an outbound connection to the declared destination.

use crate::config::TimeoutConfig;
use crate::error::SockquicError;
use crate::protocol::{read_flow_open, read_handshake, unix_now, HandshakeRequest, Network};
use crate::relay::{splice, splice_datagrams};
use crate::transport::{SocketOpts, TunnelAcceptor, TunnelConnection};
use anyhow::{anyhow, Context, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Bound on reading one handshake off its control stream
const HANDSHAKE_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote agent
pub struct TunnelServer<A: TunnelAcceptor> {
    acceptor: A,
    timeouts: Arc<TimeoutConfig>,
}

impl<A: TunnelAcceptor> TunnelServer<A> {
    /// Create a server accepting on `acceptor`
    pub fn new(acceptor: A, timeouts: TimeoutConfig) -> Self {
        TunnelServer {
            acceptor,
            timeouts: Arc::new(timeouts),
        }
    }

    /// Address the acceptor is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.acceptor.local_addr()
    }

    /// Accept connections until shutdown or until the acceptor closes
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        info!("Tunnel server listening on {}", self.local_addr()?);

        loop {
            tokio::select! {
                connecting = self.acceptor.accept() => {
                    let Some(connecting) = connecting else {
                        info!("Acceptor closed");
                        break;
                    };
                    let timeouts = self.timeouts.clone();
                    tokio::spawn(async move {
                        match connecting.await {
                            Ok(conn) => serve_connection(conn, timeouts).await,
                            Err(e) => warn!("Failed to establish tunnel connection: {:#}", e),
                        }
                    });
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping server");
                    break;
                }
            }
        }

        info!("Server stopped");
        Ok(())
    }
}

/// Serve every flow on one tunnel connection
///
/// Control streams and payload streams are consumed strictly in turn, so
/// the k-th handshake is paired with the k-th payload stream. A rejected
/// handshake still consumes its payload stream, which is then closed. An
/// accepted flow is dialed once its stream's open marker has arrived.
pub async fn serve_connection<T: TunnelConnection>(conn: T, timeouts: Arc<TimeoutConfig>) {
    let remote = conn.remote_addr();
    info!("Tunnel connection from {}", remote);

    loop {
        let mut control = match conn.accept_uni().await {
            Ok(Some(stream)) => stream,
            Ok(None) => break,
            Err(e) => {
                warn!("Tunnel connection from {} failed: {:#}", remote, e);
                break;
            }
        };

        let verdict = accept_handshake(&mut control, &timeouts).await;
        drop(control);

        let (send, recv) = match conn.accept_bi().await {
            Ok(Some(stream)) => stream,
            Ok(None) => break,
            Err(e) => {
                warn!("Tunnel connection from {} failed: {:#}", remote, e);
                break;
            }
        };

        match verdict {
            Ok(request) => {
                let timeouts = timeouts.clone();
                tokio::spawn(async move {
                    let destination = request.to_string();
                    if let Err(e) = open_and_serve(request, send, recv, &timeouts).await {
                        warn!("Flow to {} failed: {:#}", destination, e);
                    }
                });
            }
            Err(e) => {
                warn!("Rejected flow from {}: {:#}", remote, e);
            }
        }
    }

    info!("Tunnel connection from {} closed", remote);
}

/// Read, decode and check the freshness of one handshake
async fn accept_handshake<R>(control: &mut R, timeouts: &TimeoutConfig) -> Result<HandshakeRequest>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let request = tokio::time::timeout(HANDSHAKE_READ_TIMEOUT, read_handshake(control))
        .await
        .map_err(|_| SockquicError::Timeout("reading handshake".to_string()))??;

    request.check_freshness(unix_now(), timeouts.handshake_window_secs)?;
    debug!("Accepted handshake for {} (nonce {})", request, request.nonce);

    Ok(request)
}

/// Wait for the open marker of an accepted flow, then serve it
async fn open_and_serve<W, R>(
    request: HandshakeRequest,
    send: W,
    mut recv: R,
    timeouts: &TimeoutConfig,
) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
    R: tokio::io::AsyncRead + Unpin,
{
    tokio::time::timeout(HANDSHAKE_READ_TIMEOUT, read_flow_open(&mut recv))
        .await
        .map_err(|_| SockquicError::Timeout("reading flow open marker".to_string()))??;

    serve_flow(request, send, recv, timeouts).await
}

/// Dial the declared destination and relay the flow until either side ends
pub async fn serve_flow<W, R>(
    request: HandshakeRequest,
    send: W,
    recv: R,
    timeouts: &TimeoutConfig,
) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
    R: tokio::io::AsyncRead + Unpin,
{
    let destination = request.destination();

    match request.network {
        Network::Tcp => {
            let stream = tokio::time::timeout(timeouts.dial(), TcpStream::connect(&destination))
                .await
                .map_err(|_| SockquicError::Timeout(format!("connect to {}", destination)))?
                .with_context(|| format!("Failed to connect to {}", destination))?;
            SocketOpts::for_flow().apply(&stream)?;

            info!("Relaying {}", request);
            let (target_read, target_write) = stream.into_split();
            splice(recv, send, target_read, target_write).await
        }
        Network::Udp => {
            let socket = tokio::time::timeout(timeouts.dial(), connect_udp(&destination))
                .await
                .map_err(|_| SockquicError::Timeout(format!("resolve {}", destination)))??;

            info!("Relaying {}", request);
            splice_datagrams(recv, send, &socket, timeouts.flow_idle()).await
        }
    }
}

/// Bind an ephemeral socket of the right family and connect it to
/// `destination`
async fn connect_udp(destination: &str) -> Result<UdpSocket> {
    let addr = tokio::net::lookup_host(destination)
        .await
        .with_context(|| format!("Failed to resolve {}", destination))?
        .next()
        .ok_or_else(|| anyhow!("No address found for {}", destination))?;

    let bind = match addr {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    let socket = UdpSocket::bind(bind).await?;
    socket.connect(addr).await?;

    Ok(socket)
}

//! Tunnel client
//!
//! Owns the shared connection to the remote agent and opens one flow per
//! SOCKS5 CONNECT or UDP client address on it.

use crate::protocol::{write_flow_open, write_handshake, HandshakeRequest, Network, NonceGenerator};
use crate::transport::{TunnelConnection, TunnelConnector};
use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Both halves of a flow's payload stream
pub struct Flow<T: TunnelConnection> {
    /// Client to destination
    pub send: T::SendStream,
    /// Destination to client
    pub recv: T::RecvStream,
}

/// Client side of the tunnel
///
/// One connection is dialed lazily, shared by every flow, and re-dialed
/// when the transport reports it closed.
pub struct TunnelClient<C: TunnelConnector> {
    connector: C,
    connection: Mutex<Option<C::Connection>>,
    nonces: NonceGenerator,
}

impl<C: TunnelConnector> TunnelClient<C> {
    /// Create a client that dials through `connector`
    pub fn new(connector: C) -> Self {
        Self::with_nonces(connector, NonceGenerator::new())
    }

    /// Create a client with a specific nonce source
    pub fn with_nonces(connector: C, nonces: NonceGenerator) -> Self {
        TunnelClient {
            connector,
            connection: Mutex::new(None),
            nonces,
        }
    }

    /// The underlying connector
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Return the cached live connection or dial a new one
    pub async fn connect(&self) -> Result<C::Connection> {
        let mut slot = self.connection.lock().await;
        self.connect_locked(&mut slot).await
    }

    async fn connect_locked(&self, slot: &mut Option<C::Connection>) -> Result<C::Connection> {
        if let Some(conn) = slot.as_ref() {
            if !conn.is_closed() {
                return Ok(conn.clone());
            }
            debug!("Tunnel connection to {} is closed, re-dialing", conn.remote_addr());
        }

        let conn = self
            .connector
            .connect()
            .await
            .with_context(|| "Failed to connect to tunnel server")?;
        info!("Tunnel connection established to {}", conn.remote_addr());

        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Declare the destination of the next flow stream on `conn`
    ///
    /// Opens a unidirectional stream, writes the handshake and finishes the
    /// stream. The server sends no acknowledgement. If the handshake stream
    /// opened but could not be written, an empty flow stream is opened in its
    /// place so the server, which rejects the handshake, still consumes
    /// exactly one flow stream for it.
    pub async fn handshake(
        &self,
        conn: &C::Connection,
        network: Network,
        host: &str,
        port: u16,
    ) -> Result<()> {
        let request = HandshakeRequest::new(network, host, port, self.nonces.generate());

        let mut control = conn
            .open_uni()
            .await
            .with_context(|| "Failed to open handshake stream")?;
        if let Err(e) = write_handshake(&mut control, &request).await {
            drop(control);
            if let Err(fill) = self.open_flow_stream(conn).await {
                debug!("Failed to open filler flow stream: {:#}", fill);
            }
            return Err(e);
        }

        debug!("Handshake sent for {}", request);
        Ok(())
    }

    /// Open the payload stream of a flow on `conn`
    ///
    /// The open marker is written right away so the server accepts the
    /// stream and dials even if the destination is the first to speak.
    pub async fn open_flow_stream(&self, conn: &C::Connection) -> Result<Flow<C::Connection>> {
        let (mut send, recv) = conn.open_bi().await?;
        write_flow_open(&mut send).await?;
        Ok(Flow { send, recv })
    }

    /// Open a flow to `host:port` in two phases
    ///
    /// Phase one sends the handshake, phase two opens the payload stream.
    /// Both run under the connection lock, so the server sees each flow's
    /// handshake stream and payload stream in the same relative order.
    ///
    /// A failure fails this flow only. The connection is forgotten once the
    /// transport reports it closed. The one exception is a payload stream
    /// that fails to open on a live connection after its handshake went out:
    /// the server would pair that handshake with the next flow's stream, so
    /// the connection is closed, which also ends the flows it carries.
    pub async fn open_flow(
        &self,
        network: Network,
        host: &str,
        port: u16,
    ) -> Result<Flow<C::Connection>> {
        let mut slot = self.connection.lock().await;
        let conn = self.connect_locked(&mut slot).await?;

        if let Err(e) = self.handshake(&conn, network, host, port).await {
            warn!("Failed to declare {} flow to {}:{}: {:#}", network, host, port, e);
            if conn.is_closed() {
                *slot = None;
            }
            return Err(e);
        }

        match self.open_flow_stream(&conn).await {
            Ok(flow) => Ok(flow),
            Err(e) => {
                warn!("Failed to open {} flow to {}:{}: {:#}", network, host, port, e);
                if !conn.is_closed() {
                    warn!(
                        "Closing tunnel connection to {}: stream pairing lost",
                        conn.remote_addr()
                    );
                    conn.close();
                }
                *slot = None;
                Err(e)
            }
        }
    }
}

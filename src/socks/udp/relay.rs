//! UDP relay for SOCKS5 UDP ASSOCIATE
//!
//! One socket receives encapsulated datagrams from every local client.
//! Each client address gets its own tunnel flow; payloads go out on that
//! flow and whatever comes back is re-wrapped with the client's latest
//! request header and sent to the client.

use super::packet::{frame_datagram, parse_udp_envelope};
use crate::client::{Flow, TunnelClient};
use crate::protocol::Network;
use crate::relay::DATAGRAM_BUFFER_SIZE;
use crate::transport::{TunnelConnection, TunnelConnector};
use anyhow::{Context, Result};
use bytes::Bytes;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, Notify};
use tracing::{debug, info, warn};

/// Payloads queued per flow before new ones are dropped
const FLOW_QUEUE_LEN: usize = 256;

/// State of one client address
struct FlowEntry {
    id: u64,
    /// Header of the most recent datagram from this client
    header: Bytes,
    queue: mpsc::Sender<Bytes>,
    last_active: Instant,
    shutdown: Arc<Notify>,
}

/// The UDP relay shared by every ASSOCIATE on the client agent
pub struct UdpRelay<C: TunnelConnector> {
    socket: Arc<UdpSocket>,
    tunnel: Arc<TunnelClient<C>>,
    flows: Arc<DashMap<SocketAddr, FlowEntry>>,
    idle_timeout: Duration,
    next_id: AtomicU64,
}

impl<C: TunnelConnector> UdpRelay<C> {
    /// Bind the relay socket on `addr`
    pub async fn bind(
        addr: SocketAddr,
        tunnel: Arc<TunnelClient<C>>,
        idle_timeout: Duration,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("Failed to bind UDP relay on {}", addr))?;

        Ok(UdpRelay {
            socket: Arc::new(socket),
            tunnel,
            flows: Arc::new(DashMap::new()),
            idle_timeout,
            next_id: AtomicU64::new(0),
        })
    }

    /// Address the relay socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Number of live client flows
    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    /// Header currently stored for `client`
    pub fn header_for(&self, client: &SocketAddr) -> Option<Bytes> {
        self.flows.get(client).map(|entry| entry.header.clone())
    }

    /// Receive datagrams until shutdown
    ///
    /// A receive that sees nothing for the idle timeout is not an error; it
    /// triggers a sweep of idle flows and the loop continues. While traffic
    /// flows, a sweep also runs once per idle timeout.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        info!("UDP relay listening on {}", self.local_addr()?);

        let mut buf = vec![0u8; DATAGRAM_BUFFER_SIZE];
        let mut last_sweep = Instant::now();

        loop {
            let received = tokio::select! {
                result = tokio::time::timeout(self.idle_timeout, self.socket.recv_from(&mut buf)) => result,
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping UDP relay");
                    break;
                }
            };

            match received {
                Ok(Ok((len, client))) => {
                    let datagram = Bytes::copy_from_slice(&buf[..len]);
                    self.handle_datagram(client, datagram).await;
                }
                Ok(Err(e)) => {
                    // ICMP errors from earlier sends surface here; keep going
                    debug!("UDP relay receive error: {}", e);
                }
                Err(_) => {
                    self.sweep_idle();
                    last_sweep = Instant::now();
                    continue;
                }
            }

            if last_sweep.elapsed() >= self.idle_timeout {
                self.sweep_idle();
                last_sweep = Instant::now();
            }
        }

        for entry in self.flows.iter() {
            entry.shutdown.notify_one();
        }
        Ok(())
    }

    /// Route one datagram from `client`
    ///
    /// Malformed or fragmented datagrams and unresolvable destinations are
    /// dropped.
    pub async fn handle_datagram(&self, client: SocketAddr, datagram: Bytes) {
        let envelope = match parse_udp_envelope(datagram).await {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!("Dropping UDP datagram from {}: {}", client, e);
                return;
            }
        };

        if let Some(mut entry) = self.flows.get_mut(&client) {
            entry.header = envelope.header;
            entry.last_active = Instant::now();
            if entry.queue.try_send(envelope.payload).is_err() {
                warn!("UDP flow for {} is backed up, dropping datagram", client);
            }
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (queue, payloads) = mpsc::channel(FLOW_QUEUE_LEN);
        let shutdown = Arc::new(Notify::new());
        let header = envelope.header.clone();

        // Cannot fail: the receiver is still in hand
        let _ = queue.try_send(envelope.payload);

        self.flows.insert(
            client,
            FlowEntry {
                id,
                header: envelope.header,
                queue,
                last_active: Instant::now(),
                shutdown: shutdown.clone(),
            },
        );

        debug!(
            "New UDP flow {} for {} to {}",
            id, client, envelope.destination
        );

        let flow = FlowTask {
            id,
            client,
            destination: envelope.destination,
            initial_header: header,
            socket: self.socket.clone(),
            tunnel: self.tunnel.clone(),
            flows: self.flows.clone(),
            shutdown,
        };
        tokio::spawn(flow.run(payloads));
    }

    /// Signal every flow idle longer than the timeout to shut down
    ///
    /// Entries are not removed here; each flow's return relay removes its own.
    pub fn sweep_idle(&self) {
        for entry in self.flows.iter() {
            if entry.last_active.elapsed() > self.idle_timeout {
                debug!("UDP flow {} for {} is idle", entry.id, entry.key());
                entry.shutdown.notify_one();
            }
        }
    }
}

/// One client address's flow: opens the tunnel flow, feeds it queued
/// payloads, and relays replies back until the flow ends
struct FlowTask<C: TunnelConnector> {
    id: u64,
    client: SocketAddr,
    destination: SocketAddr,
    initial_header: Bytes,
    socket: Arc<UdpSocket>,
    tunnel: Arc<TunnelClient<C>>,
    flows: Arc<DashMap<SocketAddr, FlowEntry>>,
    shutdown: Arc<Notify>,
}

impl<C: TunnelConnector> FlowTask<C> {
    async fn run(self, payloads: mpsc::Receiver<Bytes>) {
        let host = self.destination.ip().to_string();
        let opened = tokio::select! {
            result = self.tunnel.open_flow(Network::Udp, &host, self.destination.port()) => Some(result),
            _ = self.shutdown.notified() => None,
        };

        match opened {
            Some(Ok(flow)) => self.relay(flow, payloads).await,
            Some(Err(e)) => warn!(
                "Failed to open UDP flow for {} to {}: {:#}",
                self.client, self.destination, e
            ),
            None => debug!("UDP flow {} shut down before opening", self.id),
        }

        self.flows.remove_if(&self.client, |_, entry| entry.id == self.id);
        debug!("UDP flow {} for {} removed", self.id, self.client);
    }

    async fn relay(&self, flow: Flow<C::Connection>, payloads: mpsc::Receiver<Bytes>) {
        let writer = tokio::spawn(write_payloads(flow.send, payloads));

        tokio::select! {
            result = self.return_relay(flow.recv) => {
                if let Err(e) = result {
                    debug!("UDP flow {} return relay error: {}", self.id, e);
                }
            }
            _ = self.shutdown.notified() => {
                debug!("UDP flow {} shutting down", self.id);
            }
        }

        writer.abort();
    }

    /// Turn each stream read into one datagram to the client
    async fn return_relay(
        &self,
        mut recv: <C::Connection as TunnelConnection>::RecvStream,
    ) -> std::io::Result<()> {
        let mut buf = vec![0u8; DATAGRAM_BUFFER_SIZE];

        loop {
            let n = recv.read(&mut buf).await?;
            if n == 0 {
                debug!("UDP flow {} stream closed", self.id);
                return Ok(());
            }

            let header = match self.flows.get_mut(&self.client) {
                Some(mut entry) if entry.id == self.id => {
                    entry.last_active = Instant::now();
                    entry.header.clone()
                }
                _ => self.initial_header.clone(),
            };

            let datagram = frame_datagram(&header, &buf[..n]);
            self.socket.send_to(&datagram, self.client).await?;
        }
    }
}

/// Write queued payloads to the flow stream until the queue closes
async fn write_payloads<W>(mut send: W, mut payloads: mpsc::Receiver<Bytes>)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(payload) = payloads.recv().await {
        if let Err(e) = send.write_all(&payload).await {
            debug!("UDP flow write error: {}", e);
            break;
        }
        if send.flush().await.is_err() {
            break;
        }
    }
    let _ = send.shutdown().await;
}

//! In-process tunnel transport
//!
//! Connections are pairs of channels exchanging [`DuplexStream`]s, so both
//! agents can run inside one process without sockets or certificates.
//! Streams are accepted in the order they were opened, as with QUIC.
//! Closing a connection stops new streams; streams already open end when
//! their halves are dropped. A connection whose peer end is gone reports
//! itself closed.

use super::{Connecting, TunnelAcceptor, TunnelConnection, TunnelConnector};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, Mutex, Notify};

/// Buffer size of each in-memory stream
const STREAM_BUFFER: usize = 64 * 1024;

/// Streams a peer may open before the other side accepts them
const STREAM_BACKLOG: usize = 1024;

/// Connections waiting to be accepted
const CONNECTION_BACKLOG: usize = 64;

type Half = (WriteHalf<DuplexStream>, ReadHalf<DuplexStream>);

/// Close state shared by both ends of a connection
#[derive(Default)]
struct CloseState {
    closed: AtomicBool,
    notify: Notify,
}

impl CloseState {
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn closed(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

struct Endpoint {
    uni_tx: mpsc::Sender<ReadHalf<DuplexStream>>,
    bi_tx: mpsc::Sender<Half>,
    uni_rx: Mutex<mpsc::Receiver<ReadHalf<DuplexStream>>>,
    bi_rx: Mutex<mpsc::Receiver<Half>>,
    state: Arc<CloseState>,
    remote: SocketAddr,
}

/// One end of an in-memory tunnel connection
#[derive(Clone)]
pub struct MemoryConnection {
    inner: Arc<Endpoint>,
}

impl MemoryConnection {
    /// Create both ends of a connection
    pub fn pair() -> (MemoryConnection, MemoryConnection) {
        let (a_uni_tx, b_uni_rx) = mpsc::channel(STREAM_BACKLOG);
        let (b_uni_tx, a_uni_rx) = mpsc::channel(STREAM_BACKLOG);
        let (a_bi_tx, b_bi_rx) = mpsc::channel(STREAM_BACKLOG);
        let (b_bi_tx, a_bi_rx) = mpsc::channel(STREAM_BACKLOG);
        let state = Arc::new(CloseState::default());
        let loopback = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);

        let a = Endpoint {
            uni_tx: a_uni_tx,
            bi_tx: a_bi_tx,
            uni_rx: Mutex::new(a_uni_rx),
            bi_rx: Mutex::new(a_bi_rx),
            state: state.clone(),
            remote: loopback,
        };
        let b = Endpoint {
            uni_tx: b_uni_tx,
            bi_tx: b_bi_tx,
            uni_rx: Mutex::new(b_uni_rx),
            bi_rx: Mutex::new(b_bi_rx),
            state,
            remote: loopback,
        };

        (
            MemoryConnection { inner: Arc::new(a) },
            MemoryConnection { inner: Arc::new(b) },
        )
    }

    fn check_open(&self) -> Result<()> {
        if self.inner.state.is_closed() {
            return Err(anyhow!("connection closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl TunnelConnection for MemoryConnection {
    type SendStream = WriteHalf<DuplexStream>;
    type RecvStream = ReadHalf<DuplexStream>;

    async fn open_uni(&self) -> Result<Self::SendStream> {
        self.check_open()?;
        let (local, remote) = tokio::io::duplex(STREAM_BUFFER);
        let (_, local_write) = tokio::io::split(local);
        let (remote_read, _) = tokio::io::split(remote);
        self.inner
            .uni_tx
            .send(remote_read)
            .await
            .map_err(|_| anyhow!("peer is gone"))?;
        Ok(local_write)
    }

    async fn open_bi(&self) -> Result<(Self::SendStream, Self::RecvStream)> {
        self.check_open()?;
        let (local, remote) = tokio::io::duplex(STREAM_BUFFER);
        let (local_read, local_write) = tokio::io::split(local);
        let (remote_read, remote_write) = tokio::io::split(remote);
        self.inner
            .bi_tx
            .send((remote_write, remote_read))
            .await
            .map_err(|_| anyhow!("peer is gone"))?;
        Ok((local_write, local_read))
    }

    async fn accept_uni(&self) -> Result<Option<Self::RecvStream>> {
        let mut rx = self.inner.uni_rx.lock().await;
        tokio::select! {
            stream = rx.recv() => Ok(stream),
            _ = self.inner.state.closed() => Ok(None),
        }
    }

    async fn accept_bi(&self) -> Result<Option<(Self::SendStream, Self::RecvStream)>> {
        let mut rx = self.inner.bi_rx.lock().await;
        tokio::select! {
            stream = rx.recv() => Ok(stream),
            _ = self.inner.state.closed() => Ok(None),
        }
    }

    fn remote_addr(&self) -> SocketAddr {
        self.inner.remote
    }

    fn is_closed(&self) -> bool {
        self.inner.state.is_closed() || self.inner.uni_tx.is_closed()
    }

    fn close(&self) {
        self.inner.state.close();
    }
}

/// Create a connected connector/acceptor pair
pub fn channel() -> (MemoryConnector, MemoryAcceptor) {
    let (tx, rx) = mpsc::channel(CONNECTION_BACKLOG);
    let dialed = Arc::new(AtomicUsize::new(0));
    (
        MemoryConnector {
            tx,
            dialed: dialed.clone(),
        },
        MemoryAcceptor {
            rx: Mutex::new(rx),
        },
    )
}

/// Dials a [`MemoryAcceptor`]
pub struct MemoryConnector {
    tx: mpsc::Sender<MemoryConnection>,
    dialed: Arc<AtomicUsize>,
}

impl MemoryConnector {
    /// Number of connections dialed so far
    pub fn connections_dialed(&self) -> usize {
        self.dialed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TunnelConnector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<Self::Connection> {
        let (client, server) = MemoryConnection::pair();
        self.tx
            .send(server)
            .await
            .map_err(|_| anyhow!("acceptor is gone"))?;
        self.dialed.fetch_add(1, Ordering::SeqCst);
        Ok(client)
    }
}

/// Accepts connections from a [`MemoryConnector`]
pub struct MemoryAcceptor {
    rx: Mutex<mpsc::Receiver<MemoryConnection>>,
}

#[async_trait]
impl TunnelAcceptor for MemoryAcceptor {
    type Connection = MemoryConnection;

    async fn accept(&self) -> Option<Connecting<Self::Connection>> {
        let connection = self.rx.lock().await.recv().await?;
        Some(Box::pin(async move { Ok(connection) }))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
    }
}

//! Bidirectional data relay
//!
//! Every flow is two copy loops, one per direction. When either loop ends
//! the whole flow is torn down: all four halves are dropped, which closes
//! sockets and tunnel streams alike.

use anyhow::Result;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::debug;

/// Largest datagram relayed in one piece
pub const DATAGRAM_BUFFER_SIZE: usize = 65535;

/// Copy `src` into `dst` until EOF or error, then shut down `dst`
///
/// Both ends are consumed and dropped on return, whatever the outcome.
pub async fn copy_and_close<R, W>(mut src: R, mut dst: W) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = tokio::io::copy(&mut src, &mut dst).await;
    let _ = dst.shutdown().await;
    result
}

/// Relay between two endpoints given as read/write halves
///
/// Returns once either direction finishes; the other direction is cancelled
/// and its halves dropped.
pub async fn splice<AR, AW, BR, BW>(a_read: AR, a_write: AW, b_read: BR, b_write: BW) -> Result<()>
where
    AR: AsyncRead + Unpin,
    AW: AsyncWrite + Unpin,
    BR: AsyncRead + Unpin,
    BW: AsyncWrite + Unpin,
{
    let a_to_b = copy_and_close(a_read, b_write);
    let b_to_a = copy_and_close(b_read, a_write);

    tokio::select! {
        result = a_to_b => {
            match result {
                Ok(bytes) => debug!("A->B finished: {} bytes", bytes),
                Err(e) => debug!("A->B error: {}", e),
            }
        }
        result = b_to_a => {
            match result {
                Ok(bytes) => debug!("B->A finished: {} bytes", bytes),
                Err(e) => debug!("B->A error: {}", e),
            }
        }
    }

    Ok(())
}

/// Relay between a tunnel stream and a connected UDP socket
///
/// Each stream read becomes one datagram and each received datagram is
/// written to the stream as is. The flow ends on stream EOF, on any error,
/// or when neither direction has carried a datagram for `idle`.
pub async fn splice_datagrams<R, W>(
    mut stream_read: R,
    mut stream_write: W,
    socket: &UdpSocket,
    idle: Duration,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let activity = Activity::new();

    let to_socket = async {
        let mut buf = vec![0u8; DATAGRAM_BUFFER_SIZE];
        loop {
            let n = stream_read.read(&mut buf).await?;
            if n == 0 {
                return Ok::<_, io::Error>(());
            }
            socket.send(&buf[..n]).await?;
            activity.touch();
        }
    };

    let to_stream = async {
        let mut buf = vec![0u8; DATAGRAM_BUFFER_SIZE];
        loop {
            let deadline = activity.last() + idle;
            let n = match tokio::time::timeout_at(deadline, socket.recv(&mut buf)).await {
                Ok(result) => result?,
                Err(_) if activity.last() + idle > Instant::now() => continue,
                Err(_) => {
                    debug!("UDP flow idle for {:?}", idle);
                    return Ok::<_, io::Error>(());
                }
            };
            activity.touch();
            stream_write.write_all(&buf[..n]).await?;
            stream_write.flush().await?;
        }
    };

    tokio::select! {
        result = to_socket => {
            if let Err(e) = result {
                debug!("Stream->UDP error: {}", e);
            }
        }
        result = to_stream => {
            if let Err(e) = result {
                debug!("UDP->Stream error: {}", e);
            }
        }
    }

    let _ = stream_write.shutdown().await;
    Ok(())
}

/// Last time a datagram crossed a flow in either direction
struct Activity {
    start: Instant,
    elapsed_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Activity {
            start: Instant::now(),
            elapsed_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let elapsed = self.start.elapsed().as_millis() as u64;
        self.elapsed_ms.store(elapsed, Ordering::Relaxed);
    }

    fn last(&self) -> Instant {
        self.start + Duration::from_millis(self.elapsed_ms.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_copy_and_close_shuts_down_destination() {
        let (mut src_peer, src) = duplex(64);
        let (dst, mut dst_peer) = duplex(64);

        let copy = tokio::spawn(copy_and_close(src, dst));

        src_peer.write_all(b"payload").await.unwrap();
        drop(src_peer);

        let mut received = Vec::new();
        dst_peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"payload");
        assert_eq!(copy.await.unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn test_splice_relays_both_directions() {
        let (mut client, a) = duplex(1024);
        let (b, mut target) = duplex(1024);

        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);
        let relay = tokio::spawn(splice(a_read, a_write, b_read, b_write));

        client.write_all(b"hello from a").await.unwrap();
        let mut buf = [0u8; 12];
        target.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello from a");

        target.write_all(b"hello from b").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello from b");

        drop(client);
        tokio::time::timeout(Duration::from_secs(1), relay)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_splice_teardown_closes_other_side() {
        let (client, a) = duplex(1024);
        let (b, mut target) = duplex(1024);

        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);
        let relay = tokio::spawn(splice(a_read, a_write, b_read, b_write));

        drop(client);

        // The target sees EOF once the relay has torn the flow down
        let mut rest = Vec::new();
        tokio::time::timeout(Duration::from_secs(1), target.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();
        assert!(rest.is_empty());
        relay.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_splice_datagrams_one_read_one_datagram() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(peer.local_addr().unwrap()).await.unwrap();
        peer.connect(socket.local_addr().unwrap()).await.unwrap();

        let (mut tunnel, stream) = duplex(1024);
        let (stream_read, stream_write) = tokio::io::split(stream);

        let relay = tokio::spawn(async move {
            splice_datagrams(stream_read, stream_write, &socket, Duration::from_secs(5)).await
        });

        tunnel.write_all(b"query").await.unwrap();
        let mut buf = [0u8; 64];
        let n = peer.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"query");

        peer.send(b"answer").await.unwrap();
        let mut reply = [0u8; 6];
        tunnel.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"answer");

        drop(tunnel);
        tokio::time::timeout(Duration::from_secs(1), relay)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_splice_datagrams_one_way_traffic_keeps_flow() {
        let sink = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(sink.local_addr().unwrap()).await.unwrap();

        let (mut tunnel, stream) = duplex(1024);
        let (stream_read, stream_write) = tokio::io::split(stream);
        let relay = tokio::spawn(async move {
            splice_datagrams(stream_read, stream_write, &socket, Duration::from_millis(200)).await
        });

        // The destination never answers; client datagrams alone keep it up
        let mut buf = [0u8; 64];
        for i in 0..8u8 {
            tunnel.write_all(&[i]).await.unwrap();
            let n = sink.recv(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], &[i]);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(!relay.is_finished());

        // Once both directions are quiet the flow ends
        tokio::time::timeout(Duration::from_secs(2), relay)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_splice_datagrams_idle_timeout() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect("127.0.0.1:9").await.unwrap();

        let (mut tunnel, stream) = duplex(1024);
        let (stream_read, stream_write) = tokio::io::split(stream);

        tokio::time::timeout(
            Duration::from_secs(2),
            splice_datagrams(stream_read, stream_write, &socket, Duration::from_millis(50)),
        )
        .await
        .unwrap()
        .unwrap();

        // Stream side was shut down
        let mut rest = Vec::new();
        tunnel.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }
}

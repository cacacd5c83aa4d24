//! Protocol codec for serialization and deserialization
//!
//! Handshakes are bincode-encoded and travel alone on a unidirectional
//! stream, so the stream's end delimits the message. Flow streams open with
//! a single marker byte.

use super::types::{HandshakeRequest, FLOW_OPEN_MARKER, MAX_HANDSHAKE_LEN};
use crate::error::SockquicError;
use anyhow::{Context, Result};
use bincode::Options;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

fn options() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_HANDSHAKE_LEN)
}

/// Encode a handshake request
pub fn encode_handshake(request: &HandshakeRequest) -> Result<Vec<u8>, SockquicError> {
    options()
        .serialize(request)
        .map_err(|e| SockquicError::Serialization(e.to_string()))
}

/// Decode a handshake request; trailing bytes are rejected
pub fn decode_handshake(buf: &[u8]) -> Result<HandshakeRequest, SockquicError> {
    options()
        .deserialize(buf)
        .map_err(|e| SockquicError::Handshake(format!("failed to decode handshake: {}", e)))
}

/// Write a handshake request and close the sending side
pub async fn write_handshake<T: AsyncWrite + Unpin>(
    conn: &mut T,
    request: &HandshakeRequest,
) -> Result<()> {
    let buf = encode_handshake(request)?;
    trace!("Write handshake {} of length {}", request, buf.len());

    conn.write_all(&buf)
        .await
        .with_context(|| "Failed to write handshake")?;
    conn.shutdown()
        .await
        .with_context(|| "Failed to finish handshake stream")?;
    Ok(())
}

/// Read a handshake request up to the end of the stream
pub async fn read_handshake<T: AsyncRead + Unpin>(conn: &mut T) -> Result<HandshakeRequest> {
    let mut buf = Vec::new();
    // One byte past the limit so oversized messages fail to decode
    conn.take(MAX_HANDSHAKE_LEN + 1)
        .read_to_end(&mut buf)
        .await
        .with_context(|| "Failed to read handshake")?;

    Ok(decode_handshake(&buf)?)
}

/// Announce a freshly opened flow stream to the peer
pub async fn write_flow_open<T: AsyncWrite + Unpin>(conn: &mut T) -> Result<()> {
    conn.write_all(&[FLOW_OPEN_MARKER])
        .await
        .with_context(|| "Failed to write flow open marker")?;
    conn.flush()
        .await
        .with_context(|| "Failed to flush flow open marker")?;
    Ok(())
}

/// Consume the marker that starts every flow stream
pub async fn read_flow_open<T: AsyncRead + Unpin>(conn: &mut T) -> Result<()> {
    let marker = conn
        .read_u8()
        .await
        .with_context(|| "Failed to read flow open marker")?;
    if marker != FLOW_OPEN_MARKER {
        return Err(SockquicError::Protocol(format!(
            "unexpected flow open marker {:#04x}",
            marker
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::Network;

    fn sample() -> HandshakeRequest {
        HandshakeRequest::new(Network::Tcp, "example.com", 443, "ÅÄÖåäö12".to_string())
    }

    #[test]
    fn test_encode_decode_preserves_fields() {
        let original = sample();
        let encoded = encode_handshake(&original).unwrap();
        let decoded = decode_handshake(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            decode_handshake(&[0xff, 0xff, 0xff]),
            Err(SockquicError::Handshake(_))
        ));
        assert!(decode_handshake(&[]).is_err());
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut encoded = encode_handshake(&sample()).unwrap();
        encoded.push(0);
        assert!(decode_handshake(&encoded).is_err());
    }

    #[tokio::test]
    async fn test_handshake_over_stream() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        let original = sample();
        write_handshake(&mut client, &original).await.unwrap();

        let received = read_handshake(&mut server).await.unwrap();
        assert_eq!(original, received);
    }

    #[tokio::test]
    async fn test_read_handshake_oversized() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let oversized = HandshakeRequest {
            host: "a".repeat(2048),
            ..sample()
        };
        // Bypass the encoder's limit to put an oversized message on the wire
        let raw = bincode::DefaultOptions::new().serialize(&oversized).unwrap();
        client.write_all(&raw).await.unwrap();
        client.shutdown().await.unwrap();

        assert!(read_handshake(&mut server).await.is_err());
    }

    #[tokio::test]
    async fn test_flow_open_marker() {
        let (mut client, mut server) = tokio::io::duplex(64);

        write_flow_open(&mut client).await.unwrap();
        client.write_all(b"data").await.unwrap();

        read_flow_open(&mut server).await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"data");
    }

    #[tokio::test]
    async fn test_read_flow_open_rejects_other_bytes() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"GET").await.unwrap();
        assert!(read_flow_open(&mut server).await.is_err());

        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        assert!(read_flow_open(&mut server).await.is_err());
    }

    #[tokio::test]
    async fn test_read_handshake_early_eof() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        assert!(read_handshake(&mut server).await.is_err());
    }
}

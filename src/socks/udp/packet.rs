//! UDP packet encoding/decoding for SOCKS5
//!
//! Handles the encapsulation format for UDP packets in SOCKS5.

use crate::error::Socks5Error;
use crate::socks::consts::*;
use crate::socks::types::TargetAddr;
use bytes::{BufMut, Bytes, BytesMut};
use std::net::SocketAddr;

/// A decoded SOCKS5 UDP datagram
///
/// # UDP Request/Response Format
///
/// ```text
/// +----+------+------+----------+----------+----------+
/// |RSV | FRAG | ATYP | DST.ADDR | DST.PORT |   DATA   |
/// +----+------+------+----------+----------+----------+
/// | 2  |  1   |  1   | Variable |    2     | Variable |
/// +----+------+------+----------+----------+----------+
/// ```
///
/// `header` is the exact byte slice up to `DATA`, kept so it can be reused
/// verbatim as the envelope of return datagrams.
#[derive(Debug, Clone)]
pub struct UdpEnvelope {
    /// Destination as written by the client
    pub target: TargetAddr,
    /// Destination with domain names resolved
    pub destination: SocketAddr,
    /// Raw `RSV FRAG ATYP DST.ADDR DST.PORT` bytes
    pub header: Bytes,
    /// Payload following the header
    pub payload: Bytes,
}

/// Split a datagram into header, destination and payload without resolving
///
/// Rejects a non-zero RSV, a non-zero FRAG and any malformed address.
pub fn split_udp_envelope(datagram: &Bytes) -> Result<(TargetAddr, Bytes, Bytes), Socks5Error> {
    if datagram.len() < UDP_ENVELOPE_PREFIX_LEN + 1 {
        return Err(Socks5Error::MalformedRequest(format!(
            "UDP packet too short: {} bytes",
            datagram.len()
        )));
    }

    let rsv = u16::from_be_bytes([datagram[0], datagram[1]]);
    if rsv != 0 {
        return Err(Socks5Error::MalformedRequest(format!(
            "invalid RSV field: {}",
            rsv
        )));
    }

    let frag = datagram[2];
    if frag != 0 {
        return Err(Socks5Error::UnsupportedFragment(frag));
    }

    let (target, addr_len) = TargetAddr::from_bytes(&datagram[UDP_ENVELOPE_PREFIX_LEN..])?;
    let header_len = UDP_ENVELOPE_PREFIX_LEN + addr_len;

    Ok((
        target,
        datagram.slice(..header_len),
        datagram.slice(header_len..),
    ))
}

/// Parse a SOCKS5 UDP datagram, resolving a domain destination before
/// returning
///
/// Header length is 10 bytes for IPv4, 7 + name length for a domain and 22
/// for IPv6. The header and payload are zero-copy slices of `datagram`.
pub async fn parse_udp_envelope(datagram: Bytes) -> Result<UdpEnvelope, Socks5Error> {
    let (target, header, payload) = split_udp_envelope(&datagram)?;
    let destination = target.resolve().await?;

    Ok(UdpEnvelope {
        target,
        destination,
        header,
        payload,
    })
}

/// Encode a standalone UDP header for `target` (`RSV=0 FRAG=0`)
pub fn encode_udp_header(target: &TargetAddr) -> Bytes {
    let addr = target.to_bytes();
    let mut buf = BytesMut::with_capacity(UDP_ENVELOPE_PREFIX_LEN + addr.len());

    // RSV (2 bytes)
    buf.put_u16(0);
    // FRAG (1 byte)
    buf.put_u8(0);
    buf.extend_from_slice(&addr);

    buf.freeze()
}

/// Prepend a stored header to a payload to form one outgoing datagram
pub fn frame_datagram(header: &[u8], payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(header.len() + payload.len());
    buf.extend_from_slice(header);
    buf.extend_from_slice(payload);
    buf.freeze()
}

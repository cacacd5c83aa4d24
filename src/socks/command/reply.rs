//! SOCKS5 reply builder
//!
//! Constructs SOCKS5 reply messages.

use crate::error::Socks5ReplyCode;
use crate::socks::consts::*;
use anyhow::Result;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Build and send a SOCKS5 reply
///
/// # SOCKS5 Reply Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// # Arguments
///
/// * `stream` - The stream to write to
/// * `reply_code` - The reply status code
/// * `bind_addr` - The bound address (optional, defaults to 0.0.0.0:0)
pub async fn build_reply<S>(
    stream: &mut S,
    reply_code: Socks5ReplyCode,
    bind_addr: Option<SocketAddr>,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let reply = reply_bytes(reply_code, bind_addr);

    stream.write_all(&reply).await?;
    stream.flush().await?;

    Ok(())
}

fn reply_bytes(reply_code: Socks5ReplyCode, bind_addr: Option<SocketAddr>) -> Vec<u8> {
    let bind_addr =
        bind_addr.unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0));

    let mut reply = vec![SOCKS5_VERSION, reply_code.into(), SOCKS5_RESERVED];

    match bind_addr {
        SocketAddr::V4(addr) => {
            reply.push(SOCKS5_ADDR_TYPE_IPV4);
            reply.extend_from_slice(&addr.ip().octets());
            reply.extend_from_slice(&addr.port().to_be_bytes());
        }
        SocketAddr::V6(addr) => {
            reply.push(SOCKS5_ADDR_TYPE_IPV6);
            reply.extend_from_slice(&addr.ip().octets());
            reply.extend_from_slice(&addr.port().to_be_bytes());
        }
    }

    reply
}

/// Send the method selection reply "no authentication required"
pub async fn send_no_auth<S>(stream: &mut S) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE])
        .await?;
    stream.flush().await?;
    Ok(())
}

/// Send a command reply carrying only a status code
pub async fn send_reply<S>(stream: &mut S, reply_code: Socks5ReplyCode) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    build_reply(stream, reply_code, None).await
}

/// Send the UDP ASSOCIATE success reply announcing where datagrams go
pub async fn send_udp_associate_reply<S>(stream: &mut S, relay_addr: SocketAddr) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    build_reply(stream, Socks5ReplyCode::Succeeded, Some(relay_addr)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_reply_bytes_ipv4() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)), 8080);
        let reply = reply_bytes(Socks5ReplyCode::Succeeded, Some(addr));

        assert_eq!(reply[0], SOCKS5_VERSION);
        assert_eq!(reply[1], SOCKS5_REPLY_SUCCEEDED);
        assert_eq!(reply[2], SOCKS5_RESERVED);
        assert_eq!(reply[3], SOCKS5_ADDR_TYPE_IPV4);
        assert_eq!(&reply[4..8], &[192, 168, 1, 1]);
        assert_eq!(&reply[8..10], &8080u16.to_be_bytes());
    }

    #[test]
    fn test_reply_bytes_ipv6() {
        let addr = SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 443);
        let reply = reply_bytes(Socks5ReplyCode::Succeeded, Some(addr));

        assert_eq!(reply[3], SOCKS5_ADDR_TYPE_IPV6);
        assert_eq!(reply.len(), 3 + 1 + 16 + 2); // header + atyp + ipv6 + port
    }

    #[test]
    fn test_reply_bytes_default_addr() {
        let reply = reply_bytes(Socks5ReplyCode::GeneralFailure, None);

        assert_eq!(reply[1], SOCKS5_REPLY_GENERAL_FAILURE);
        assert_eq!(reply[3], SOCKS5_ADDR_TYPE_IPV4);
        assert_eq!(&reply[4..8], &[0, 0, 0, 0]); // 0.0.0.0
        assert_eq!(&reply[8..10], &[0, 0]); // port 0
    }

    #[tokio::test]
    async fn test_send_no_auth() {
        let mut buffer = Vec::new();
        send_no_auth(&mut buffer).await.unwrap();
        assert_eq!(buffer, vec![SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE]);
    }

    #[tokio::test]
    async fn test_send_reply_codes() {
        let codes = [
            (Socks5ReplyCode::ConnectionRefused, SOCKS5_REPLY_CONNECTION_REFUSED),
            (Socks5ReplyCode::CommandNotSupported, SOCKS5_REPLY_COMMAND_NOT_SUPPORTED),
            (Socks5ReplyCode::HostUnreachable, SOCKS5_REPLY_HOST_UNREACHABLE),
        ];

        for (code, byte) in codes {
            let mut buffer = Vec::new();
            send_reply(&mut buffer, code).await.unwrap();
            assert_eq!(buffer.len(), 10);
            assert_eq!(buffer[1], byte);
        }
    }

    #[tokio::test]
    async fn test_send_udp_associate_reply() {
        let mut buffer = Vec::new();
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 1083);

        send_udp_associate_reply(&mut buffer, addr).await.unwrap();

        assert_eq!(buffer[1], SOCKS5_REPLY_SUCCEEDED);
        assert_eq!(&buffer[4..8], &[127, 0, 0, 1]);
        assert_eq!(&buffer[8..10], &1083u16.to_be_bytes());
    }
}

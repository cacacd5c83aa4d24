//! TCP relay for SOCKS5 CONNECT command
//!
//! A CONNECT either goes straight to the destination (private addresses
//! with bypass enabled) or through a tunnel flow to the remote agent.

use super::handler::ProxyContext;
use crate::client::TunnelClient;
use crate::error::Socks5ReplyCode;
use crate::protocol::Network;
use crate::relay::splice;
use crate::socks::command::build_reply;
use crate::socks::types::TargetAddr;
use crate::transport::{SocketOpts, TunnelConnector};
use anyhow::{anyhow, Result};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Whether `ip` is a private address that may skip the tunnel
///
/// Covers the IPv4 RFC 1918 ranges and IPv6 unique local addresses
/// (`fc00::/7`).
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

/// The address to dial directly, if `target` may skip the tunnel
///
/// Only IP literals qualify; domain names always go through the tunnel.
fn bypass_target(target: &TargetAddr, bypass_private: bool) -> Option<SocketAddr> {
    match target {
        TargetAddr::Ip(addr) if bypass_private && is_private_ip(addr.ip()) => Some(*addr),
        _ => None,
    }
}

/// Handle TCP CONNECT command
///
/// Replies connection-refused if the destination cannot be reached either
/// way; otherwise replies success and relays until one side closes.
pub async fn handle_tcp_connect<S, C>(
    mut client_stream: S,
    target_addr: TargetAddr,
    ctx: &ProxyContext<C>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    C: TunnelConnector,
{
    if let Some(addr) = bypass_target(&target_addr, ctx.bypass_private) {
        let target_stream = match dial_direct(addr, ctx.dial_timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Direct connection to {} failed: {:#}", addr, e);
                build_reply(&mut client_stream, Socks5ReplyCode::ConnectionRefused, None).await?;
                return Err(e);
            }
        };

        build_reply(
            &mut client_stream,
            Socks5ReplyCode::Succeeded,
            target_stream.local_addr().ok(),
        )
        .await?;
        info!("SOCKS5 direct connection established to {}", addr);

        let (client_read, client_write) = tokio::io::split(client_stream);
        let (target_read, target_write) = target_stream.into_split();
        return splice(client_read, client_write, target_read, target_write).await;
    }

    relay_through_tunnel(client_stream, target_addr, &ctx.tunnel).await
}

async fn relay_through_tunnel<S, C>(
    mut client_stream: S,
    target_addr: TargetAddr,
    tunnel: &TunnelClient<C>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    C: TunnelConnector,
{
    let flow = match tunnel
        .open_flow(Network::Tcp, &target_addr.host(), target_addr.port())
        .await
    {
        Ok(flow) => flow,
        Err(e) => {
            build_reply(&mut client_stream, Socks5ReplyCode::ConnectionRefused, None).await?;
            return Err(e);
        }
    };

    build_reply(&mut client_stream, Socks5ReplyCode::Succeeded, None).await?;
    info!("SOCKS5 tunnel established to {}", target_addr);

    let (client_read, client_write) = tokio::io::split(client_stream);
    splice(client_read, client_write, flow.recv, flow.send).await
}

/// Dial `addr` directly, bounded by `timeout`
async fn dial_direct(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
    debug!("Connecting directly to {}", addr);

    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| anyhow!("Connection timeout to {}", addr))??;
    SocketOpts::for_flow().apply(&stream)?;

    Ok(stream)
}

//! Main SOCKS5 handler
//!
//! Drives one accepted SOCKS5 connection through greeting, request and
//! command execution.

use crate::client::TunnelClient;
use crate::error::Socks5ReplyCode;
use crate::socks::auth::negotiate;
use crate::socks::command::{parse_request, read_request, send_reply};
use crate::socks::tcp_relay::handle_tcp_connect;
use crate::socks::types::SocksCommand;
use crate::socks::udp::handle_udp_associate;
use crate::transport::TunnelConnector;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// Everything a SOCKS5 connection needs from the client agent
pub struct ProxyContext<C: TunnelConnector> {
    /// Tunnel to the remote agent
    pub tunnel: Arc<TunnelClient<C>>,
    /// Dial private IP literals directly instead of tunneling them
    pub bypass_private: bool,
    /// Bound on direct dials
    pub dial_timeout: Duration,
    /// Address the UDP relay is listening on
    pub udp_relay_addr: SocketAddr,
}

/// Handle SOCKS5 protocol on an accepted connection
///
/// `local_addr` is the local end of the connection; its IP is advertised
/// in the UDP ASSOCIATE reply when the relay is bound to the unspecified
/// address.
///
/// # Protocol Flow
///
/// 1. Method negotiation (a non-5 version closes without reply)
/// 2. Request parsing (any failure closes without reply)
/// 3. Command execution (CONNECT, UDP ASSOCIATE; BIND is refused)
pub async fn handle_socks5<S, C>(
    mut stream: S,
    local_addr: SocketAddr,
    ctx: Arc<ProxyContext<C>>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    C: TunnelConnector,
{
    negotiate(&mut stream)
        .await
        .with_context(|| "Method negotiation failed")?;

    let request = read_request(&mut stream)
        .await
        .with_context(|| "Failed to read SOCKS5 request")?;
    let request = parse_request(&request).with_context(|| "Failed to parse SOCKS5 request")?;

    info!("SOCKS5 {} request to {}", request.command, request.target);

    match request.command {
        SocksCommand::Connect => {
            handle_tcp_connect(stream, request.target, &ctx).await?;
        }
        SocksCommand::UdpAssociate => {
            handle_udp_associate(stream, local_addr, ctx.udp_relay_addr).await?;
        }
        SocksCommand::Bind => {
            warn!("BIND command not supported");
            send_reply(&mut stream, Socks5ReplyCode::CommandNotSupported).await?;
        }
        SocksCommand::Unknown(byte) => {
            debug!("Unknown SOCKS5 command {:#04x}", byte);
            send_reply(&mut stream, Socks5ReplyCode::CommandNotSupported).await?;
        }
    }

    Ok(())
}

//! UDP ASSOCIATE handler
//!
//! Implements the UDP ASSOCIATE command for SOCKS5.

use crate::socks::command::send_udp_associate_reply;
use anyhow::Result;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, info, warn};

/// The address to advertise for a relay bound to `relay_addr`
///
/// An unspecified relay IP is replaced by the IP the client reached us on.
pub fn advertised_relay_addr(relay_addr: SocketAddr, local_addr: SocketAddr) -> SocketAddr {
    if relay_addr.ip().is_unspecified() {
        SocketAddr::new(local_addr.ip(), relay_addr.port())
    } else {
        relay_addr
    }
}

/// Handle UDP ASSOCIATE command
///
/// # Protocol Flow
///
/// 1. Client sends UDP ASSOCIATE (its DST.ADDR and DST.PORT are ignored)
/// 2. We reply with the UDP relay's address
/// 3. The client sends encapsulated datagrams to the relay
/// 4. The TCP connection is held open until the client closes it
///
/// Closing the TCP connection does not tear down UDP flows; the relay
/// reclaims them when they go idle.
pub async fn handle_udp_associate<S>(
    mut control_stream: S,
    local_addr: SocketAddr,
    relay_addr: SocketAddr,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let bound = advertised_relay_addr(relay_addr, local_addr);
    send_udp_associate_reply(&mut control_stream, bound).await?;

    info!("UDP ASSOCIATE established, relay at {}", bound);

    monitor_control_stream(control_stream).await?;

    info!("UDP ASSOCIATE session ended");
    Ok(())
}

/// Read the control stream until the client closes it
async fn monitor_control_stream<S>(mut stream: S) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; 64];

    loop {
        match stream.read(&mut buf).await {
            Ok(0) => {
                debug!("Control stream closed, ending UDP association");
                break;
            }
            Ok(n) => {
                warn!("Ignoring {} unexpected bytes on UDP control stream", n);
            }
            Err(e) => {
                debug!("Control stream error: {}", e);
                break;
            }
        }
    }

    Ok(())
}

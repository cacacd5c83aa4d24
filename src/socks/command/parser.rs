//! SOCKS5 command parser
//!
//! Reads and parses SOCKS5 command requests from the client.

use crate::error::Socks5Error;
use crate::socks::consts::*;
use crate::socks::types::{SocksCommand, SocksRequest, TargetAddr};
use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Offset of the command byte in a request
const CMD_OFFSET: usize = 1;
/// Offset of the address type byte in a request
const ATYP_OFFSET: usize = 3;

/// Read one complete SOCKS5 request off the stream and return its raw bytes
///
/// # SOCKS5 Request Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// Exactly the request is consumed; anything the client pipelines after it
/// stays in the stream.
pub async fn read_request<S>(stream: &mut S) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    // Read: VER CMD RSV ATYP
    let mut request = vec![0u8; 4];
    stream
        .read_exact(&mut request)
        .await
        .with_context(|| "Failed to read command header")?;

    let remaining = match request[ATYP_OFFSET] {
        SOCKS5_ADDR_TYPE_IPV4 => 4 + 2,
        SOCKS5_ADDR_TYPE_IPV6 => 16 + 2,
        SOCKS5_ADDR_TYPE_DOMAIN => {
            let mut len_buf = [0u8; 1];
            stream.read_exact(&mut len_buf).await?;
            request.push(len_buf[0]);
            len_buf[0] as usize + 2
        }
        other => return Err(Socks5Error::AddressTypeNotSupported(other).into()),
    };

    let start = request.len();
    request.resize(start + remaining, 0);
    stream
        .read_exact(&mut request[start..])
        .await
        .with_context(|| "Failed to read destination address")?;

    Ok(request)
}

/// Parse a raw SOCKS5 request into command and destination
///
/// The command byte sits at a fixed offset; unknown commands are returned as
/// [`SocksCommand::Unknown`] so the caller can answer them. An unrecognised
/// address type or a truncated address is a malformed request.
pub fn parse_request(request: &[u8]) -> Result<SocksRequest, Socks5Error> {
    if request.len() <= ATYP_OFFSET {
        return Err(Socks5Error::MalformedRequest(format!(
            "request too short: {} bytes",
            request.len()
        )));
    }

    if request[0] != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(request[0]));
    }

    let command = SocksCommand::from_byte(request[CMD_OFFSET]);
    let (target, _) = TargetAddr::from_bytes(&request[ATYP_OFFSET..]).map_err(|e| match e {
        Socks5Error::AddressTypeNotSupported(t) => {
            Socks5Error::MalformedRequest(format!("unknown address type {}", t))
        }
        other => other,
    })?;

    tracing::debug!("Parsed SOCKS5 command: {} to {}", command, target);

    Ok(SocksRequest { command, target })
}

//! SOCKS5 method negotiation
//!
//! Only "no authentication" is offered; clients are authenticated by the
//! tunnel's mutual-certificate handshake, not here.

use super::command::send_no_auth;
use super::consts::*;
use crate::error::Socks5Error;
use anyhow::Result;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

/// Read the client greeting and select "no authentication"
///
/// A version byte other than 5 fails with
/// [`Socks5Error::UnsupportedVersion`] before anything is written back, so
/// the caller can drop the connection without a reply. The offered methods
/// are read and ignored.
pub async fn negotiate<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Read version and number of methods
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;

    let version = buf[0];
    let num_methods = buf[1];

    if version != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(version).into());
    }

    let mut methods = vec![0u8; num_methods as usize];
    stream.read_exact(&mut methods).await?;

    send_no_auth(stream).await
}

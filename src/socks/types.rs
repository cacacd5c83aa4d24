//! SOCKS5 type definitions
//!
//! Defines the core types used in SOCKS5 protocol handling.

use super::consts::*;
use crate::error::Socks5Error;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// SOCKS5 command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksCommand {
    /// TCP CONNECT - establish a TCP connection to target
    Connect,
    /// TCP BIND - always answered with "command not supported"
    Bind,
    /// UDP ASSOCIATE - establish UDP relay
    UdpAssociate,
    /// Any other command byte
    Unknown(u8),
}

impl SocksCommand {
    /// Parse a command byte into SocksCommand
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            SOCKS5_CMD_TCP_CONNECT => SocksCommand::Connect,
            SOCKS5_CMD_TCP_BIND => SocksCommand::Bind,
            SOCKS5_CMD_UDP_ASSOCIATE => SocksCommand::UdpAssociate,
            other => SocksCommand::Unknown(other),
        }
    }

    /// Convert SocksCommand to byte
    pub fn to_byte(self) -> u8 {
        match self {
            SocksCommand::Connect => SOCKS5_CMD_TCP_CONNECT,
            SocksCommand::Bind => SOCKS5_CMD_TCP_BIND,
            SocksCommand::UdpAssociate => SOCKS5_CMD_UDP_ASSOCIATE,
            SocksCommand::Unknown(byte) => byte,
        }
    }
}

impl fmt::Display for SocksCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksCommand::Connect => write!(f, "CONNECT"),
            SocksCommand::Bind => write!(f, "BIND"),
            SocksCommand::UdpAssociate => write!(f, "UDP ASSOCIATE"),
            SocksCommand::Unknown(byte) => write!(f, "UNKNOWN({:#04x})", byte),
        }
    }
}

/// Target address for SOCKS5 requests
///
/// Represents the destination address in a SOCKS5 request or UDP envelope.
/// Can be an IP address (v4 or v6) or a domain name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    /// IP address with port
    Ip(SocketAddr),
    /// Domain name with port
    Domain(String, u16),
}

impl TargetAddr {
    /// Create a new TargetAddr from an IPv4 address and port
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Create a new TargetAddr from an IPv6 address and port
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Create a new TargetAddr from a domain name and port
    pub fn domain(domain: String, port: u16) -> Self {
        TargetAddr::Domain(domain, port)
    }

    /// Get the port number
    pub fn port(&self) -> u16 {
        match self {
            TargetAddr::Ip(addr) => addr.port(),
            TargetAddr::Domain(_, port) => *port,
        }
    }

    /// Host part as carried in a tunnel handshake: the IP literal or the
    /// domain name, without the port
    pub fn host(&self) -> String {
        match self {
            TargetAddr::Ip(addr) => addr.ip().to_string(),
            TargetAddr::Domain(domain, _) => domain.clone(),
        }
    }

    /// IP address if this target is an IP literal
    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            TargetAddr::Ip(addr) => Some(addr.ip()),
            TargetAddr::Domain(_, _) => None,
        }
    }

    /// Get the address type byte for SOCKS5 protocol
    pub fn addr_type(&self) -> u8 {
        match self {
            TargetAddr::Ip(SocketAddr::V4(_)) => SOCKS5_ADDR_TYPE_IPV4,
            TargetAddr::Ip(SocketAddr::V6(_)) => SOCKS5_ADDR_TYPE_IPV6,
            TargetAddr::Domain(_, _) => SOCKS5_ADDR_TYPE_DOMAIN,
        }
    }

    /// Resolve the address to a SocketAddr
    ///
    /// For IP addresses, this returns immediately.
    /// For domain names, this performs DNS resolution and suspends only the
    /// calling task.
    pub async fn resolve(&self) -> Result<SocketAddr, Socks5Error> {
        match self {
            TargetAddr::Ip(addr) => Ok(*addr),
            TargetAddr::Domain(domain, port) => tokio::net::lookup_host((domain.as_str(), *port))
                .await
                .map_err(|_| Socks5Error::DnsResolution(domain.clone()))?
                .next()
                .ok_or_else(|| Socks5Error::DnsResolution(domain.clone())),
        }
    }

    /// Serialize the address to bytes for SOCKS5 protocol
    /// (`ATYP | ADDR | PORT`)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        match self {
            TargetAddr::Ip(SocketAddr::V4(addr)) => {
                bytes.push(SOCKS5_ADDR_TYPE_IPV4);
                bytes.extend_from_slice(&addr.ip().octets());
                bytes.extend_from_slice(&addr.port().to_be_bytes());
            }
            TargetAddr::Ip(SocketAddr::V6(addr)) => {
                bytes.push(SOCKS5_ADDR_TYPE_IPV6);
                bytes.extend_from_slice(&addr.ip().octets());
                bytes.extend_from_slice(&addr.port().to_be_bytes());
            }
            TargetAddr::Domain(domain, port) => {
                bytes.push(SOCKS5_ADDR_TYPE_DOMAIN);
                bytes.push(domain.len() as u8);
                bytes.extend_from_slice(domain.as_bytes());
                bytes.extend_from_slice(&port.to_be_bytes());
            }
        }

        bytes
    }

    /// Decode `ATYP | ADDR | PORT` from the front of `buf`
    ///
    /// Returns the address and the number of bytes consumed.
    pub fn from_bytes(buf: &[u8]) -> Result<(Self, usize), Socks5Error> {
        let addr_type = *buf
            .first()
            .ok_or_else(|| Socks5Error::MalformedRequest("missing address type".to_string()))?;

        // [addr_start, addr_end) holds the raw address
        let (addr_start, addr_end) = match addr_type {
            SOCKS5_ADDR_TYPE_IPV4 => (1, 1 + 4),
            SOCKS5_ADDR_TYPE_IPV6 => (1, 1 + 16),
            SOCKS5_ADDR_TYPE_DOMAIN => {
                let len = *buf.get(1).ok_or_else(|| {
                    Socks5Error::MalformedRequest("missing domain length".to_string())
                })? as usize;
                if len == 0 {
                    return Err(Socks5Error::InvalidDomain("empty domain".to_string()));
                }
                (2, 2 + len)
            }
            other => return Err(Socks5Error::AddressTypeNotSupported(other)),
        };

        let total = addr_end + 2;
        if buf.len() < total {
            return Err(Socks5Error::MalformedRequest(format!(
                "address truncated: need {} bytes, have {}",
                total,
                buf.len()
            )));
        }

        let raw = &buf[addr_start..addr_end];
        let port = u16::from_be_bytes([buf[addr_end], buf[addr_end + 1]]);

        let target = match addr_type {
            SOCKS5_ADDR_TYPE_IPV4 => {
                let mut octets = [0u8; 4];
                octets.copy_from_slice(raw);
                TargetAddr::ipv4(Ipv4Addr::from(octets), port)
            }
            SOCKS5_ADDR_TYPE_IPV6 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(raw);
                TargetAddr::ipv6(Ipv6Addr::from(octets), port)
            }
            _ => {
                let domain = std::str::from_utf8(raw).map_err(|_| {
                    Socks5Error::InvalidDomain("invalid UTF-8 in domain".to_string())
                })?;
                TargetAddr::domain(domain.to_string(), port)
            }
        };

        Ok((target, total))
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(addr) => write!(f, "{}", addr),
            TargetAddr::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<SocketAddr> for TargetAddr {
    fn from(addr: SocketAddr) -> Self {
        TargetAddr::Ip(addr)
    }
}

impl Default for TargetAddr {
    fn default() -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0))
    }
}

/// A parsed SOCKS5 command request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocksRequest {
    /// Requested command
    pub command: SocksCommand,
    /// Destination address
    pub target: TargetAddr,
}

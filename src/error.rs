//! Error types for Sockquic
//!
//! This module defines all custom error types used throughout the application.

use thiserror::Error;

/// Main error type for Sockquic operations
#[derive(Error, Debug)]
pub enum SockquicError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Transport error (dial, TLS handshake, stream open)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Tunnel handshake could not be encoded, sent or decoded
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// Tunnel handshake timestamp fell outside the freshness window
    #[error("Handshake expired: issued at {issued_at}, now {now}")]
    Expired {
        /// Timestamp carried by the request
        issued_at: i64,
        /// Server clock at verification time
        now: i64,
    },

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// SOCKS5 specific errors
#[derive(Error, Debug)]
pub enum Socks5Error {
    /// Unsupported SOCKS version
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// Address type not supported
    #[error("Address type not supported: {0}")]
    AddressTypeNotSupported(u8),

    /// Fragmented UDP datagram
    #[error("Unsupported UDP fragment: {0}")]
    UnsupportedFragment(u8),

    /// Request or envelope is truncated or otherwise malformed
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Domain name could not be resolved
    #[error("DNS resolution failed for {0}")]
    DnsResolution(String),

    /// Invalid domain name
    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),
}

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Socks5ReplyCode {
    /// Command succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddressTypeNotSupported = 0x08,
}

impl From<Socks5ReplyCode> for u8 {
    fn from(code: Socks5ReplyCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for Socks5ReplyCode {
    type Error = Socks5Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Socks5ReplyCode::Succeeded),
            0x01 => Ok(Socks5ReplyCode::GeneralFailure),
            0x02 => Ok(Socks5ReplyCode::ConnectionNotAllowed),
            0x03 => Ok(Socks5ReplyCode::NetworkUnreachable),
            0x04 => Ok(Socks5ReplyCode::HostUnreachable),
            0x05 => Ok(Socks5ReplyCode::ConnectionRefused),
            0x06 => Ok(Socks5ReplyCode::TtlExpired),
            0x07 => Ok(Socks5ReplyCode::CommandNotSupported),
            0x08 => Ok(Socks5ReplyCode::AddressTypeNotSupported),
            _ => Err(Socks5Error::MalformedRequest(format!(
                "unknown reply code {}",
                value
            ))),
        }
    }
}

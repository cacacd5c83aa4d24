//! SOCKS5 protocol constants
//!
//! Defines all constants used in the SOCKS5 protocol implementation.

/// SOCKS5 protocol version
pub const SOCKS5_VERSION: u8 = 0x05;

// Authentication methods
/// No authentication required
pub const SOCKS5_AUTH_METHOD_NONE: u8 = 0x00;
/// No acceptable methods
pub const SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE: u8 = 0xFF;

// Commands
/// TCP CONNECT command
pub const SOCKS5_CMD_TCP_CONNECT: u8 = 0x01;
/// TCP BIND command (rejected)
pub const SOCKS5_CMD_TCP_BIND: u8 = 0x02;
/// UDP ASSOCIATE command
pub const SOCKS5_CMD_UDP_ASSOCIATE: u8 = 0x03;

// Address types
/// IPv4 address
pub const SOCKS5_ADDR_TYPE_IPV4: u8 = 0x01;
/// Domain name
pub const SOCKS5_ADDR_TYPE_DOMAIN: u8 = 0x03;
/// IPv6 address
pub const SOCKS5_ADDR_TYPE_IPV6: u8 = 0x04;

// Reply codes
/// Succeeded
pub const SOCKS5_REPLY_SUCCEEDED: u8 = 0x00;
/// General SOCKS server failure
pub const SOCKS5_REPLY_GENERAL_FAILURE: u8 = 0x01;
/// Connection not allowed by ruleset
pub const SOCKS5_REPLY_CONNECTION_NOT_ALLOWED: u8 = 0x02;
/// Network unreachable
pub const SOCKS5_REPLY_NETWORK_UNREACHABLE: u8 = 0x03;
/// Host unreachable
pub const SOCKS5_REPLY_HOST_UNREACHABLE: u8 = 0x04;
/// Connection refused
pub const SOCKS5_REPLY_CONNECTION_REFUSED: u8 = 0x05;
/// TTL expired
pub const SOCKS5_REPLY_TTL_EXPIRED: u8 = 0x06;
/// Command not supported
pub const SOCKS5_REPLY_COMMAND_NOT_SUPPORTED: u8 = 0x07;
/// Address type not supported
pub const SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED: u8 = 0x08;

// Reserved byte
/// Reserved byte value (always 0x00)
pub const SOCKS5_RESERVED: u8 = 0x00;

// UDP envelope
/// Length of RSV(2) + FRAG(1) preceding ATYP in a UDP datagram
pub const UDP_ENVELOPE_PREFIX_LEN: usize = 3;
/// Full UDP header length for an IPv4 destination
pub const UDP_HEADER_LEN_IPV4: usize = 10;
/// Full UDP header length for an IPv6 destination
pub const UDP_HEADER_LEN_IPV6: usize = 22;
/// UDP header length for a domain destination, excluding the name itself
pub const UDP_HEADER_LEN_DOMAIN_BASE: usize = 7;

// Buffer sizes
/// Maximum domain name length
pub const MAX_DOMAIN_LEN: usize = 255;
/// Maximum UDP datagram size
pub const MAX_UDP_PACKET: usize = 65535;

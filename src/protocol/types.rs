//! Protocol type definitions
//!
//! The tunnel handshake declares the destination of the next flow stream
//! opened on the same connection.

use crate::error::SockquicError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Application protocol identifier negotiated during the TLS handshake
pub const ALPN_PROTOCOL: &[u8] = b"qtun/1.0";

/// Upper bound on an encoded handshake
pub const MAX_HANDSHAKE_LEN: u64 = 1024;

/// First byte the client writes on every flow stream
///
/// QUIC peers learn of a new stream only once data is sent on it. The
/// marker makes the stream visible before the destination has spoken.
pub const FLOW_OPEN_MARKER: u8 = 0x01;

/// Transport protocol of the destination
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    /// Stream socket
    #[serde(rename = "tcp")]
    Tcp,
    /// Datagram socket
    #[serde(rename = "udp")]
    Udp,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Tcp => write!(f, "tcp"),
            Network::Udp => write!(f, "udp"),
        }
    }
}

impl FromStr for Network {
    type Err = SockquicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Network::Tcp),
            "udp" => Ok(Network::Udp),
            other => Err(SockquicError::Protocol(format!("unknown network: {}", other))),
        }
    }
}

/// Tunnel handshake message
///
/// Sent once per flow on a dedicated unidirectional stream. Port and
/// timestamp travel as decimal strings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Destination network
    pub network: Network,
    /// Destination host: IP literal or domain name
    pub host: String,
    /// Destination port
    pub port: String,
    /// Unix seconds at which the request was built
    pub timestamp: String,
    /// Random string that makes successive requests distinguishable
    pub nonce: String,
}

impl HandshakeRequest {
    /// Build a request stamped with the current time
    pub fn new(network: Network, host: impl Into<String>, port: u16, nonce: String) -> Self {
        HandshakeRequest {
            network,
            host: host.into(),
            port: port.to_string(),
            timestamp: unix_now().to_string(),
            nonce,
        }
    }

    /// Timestamp as unix seconds, if it parses
    pub fn issued_at(&self) -> Option<i64> {
        self.timestamp.parse().ok()
    }

    /// Destination port as a number
    pub fn port_number(&self) -> Result<u16, SockquicError> {
        self.port
            .parse()
            .map_err(|_| SockquicError::Protocol(format!("invalid port: {}", self.port)))
    }

    /// `host:port` suitable for dialing
    pub fn destination(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Reject a request older than `window_secs` relative to `now`
    ///
    /// The boundary is inclusive: `now - window_secs` is accepted,
    /// `now - window_secs - 1` is not. Timestamps ahead of `now` are accepted.
    /// An unparsable timestamp counts as zero and is therefore expired.
    pub fn check_freshness(&self, now: i64, window_secs: u64) -> Result<(), SockquicError> {
        let issued_at = self.issued_at().unwrap_or(0);
        if now.saturating_sub(issued_at) > window_secs as i64 {
            return Err(SockquicError::Expired { issued_at, now });
        }
        Ok(())
    }
}

impl fmt::Display for HandshakeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.network, self.destination())
    }
}

/// Current unix time in seconds
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_at(timestamp: i64) -> HandshakeRequest {
        HandshakeRequest {
            timestamp: timestamp.to_string(),
            ..HandshakeRequest::new(Network::Tcp, "example.com", 443, "ABCDEFGH".to_string())
        }
    }

    #[test]
    fn test_network_display_and_parse() {
        assert_eq!(Network::Tcp.to_string(), "tcp");
        assert_eq!(Network::Udp.to_string(), "udp");
        assert_eq!("udp".parse::<Network>().unwrap(), Network::Udp);
        assert!("sctp".parse::<Network>().is_err());
    }

    #[test]
    fn test_handshake_request_new() {
        let before = unix_now();
        let request = HandshakeRequest::new(Network::Udp, "8.8.8.8", 53, "nonce123".to_string());

        assert_eq!(request.network, Network::Udp);
        assert_eq!(request.port, "53");
        assert_eq!(request.port_number().unwrap(), 53);
        assert!(request.issued_at().unwrap() >= before);
        assert_eq!(request.destination(), "8.8.8.8:53");
    }

    #[test]
    fn test_handshake_destination_ipv6() {
        let request = HandshakeRequest::new(Network::Tcp, "::1", 80, "n".to_string());
        assert_eq!(request.destination(), "[::1]:80");
        assert_eq!(request.to_string(), "tcp://[::1]:80");
    }

    #[test]
    fn test_freshness_boundary() {
        let now = 1_700_000_000;
        assert!(request_at(now).check_freshness(now, 60).is_ok());
        assert!(request_at(now - 60).check_freshness(now, 60).is_ok());

        let err = request_at(now - 61).check_freshness(now, 60).unwrap_err();
        assert!(matches!(
            err,
            SockquicError::Expired { issued_at, now: n } if issued_at == now - 61 && n == now
        ));
    }

    #[test]
    fn test_freshness_future_timestamp_accepted() {
        let now = 1_700_000_000;
        assert!(request_at(now + 3600).check_freshness(now, 60).is_ok());
    }

    #[test]
    fn test_freshness_unparsable_timestamp_rejected() {
        let request = HandshakeRequest {
            timestamp: "yesterday".to_string(),
            ..request_at(0)
        };
        assert!(request.issued_at().is_none());
        assert!(matches!(
            request.check_freshness(unix_now(), 60),
            Err(SockquicError::Expired { issued_at: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_port() {
        let request = HandshakeRequest {
            port: "http".to_string(),
            ..request_at(0)
        };
        assert!(request.port_number().is_err());
    }
}

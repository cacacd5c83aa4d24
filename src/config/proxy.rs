//! Proxy configuration types
//!
//! Defines the root configuration structure shared by the client and server
//! agents.

use super::{TimeoutConfig, TlsConfig, TransportConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Default local SOCKS5 listen address
fn default_local_addr() -> String {
    "127.0.0.1:1083".to_string()
}

/// Default tunnel server address
fn default_server_addr() -> String {
    ":8443".to_string()
}

/// Which side of the tunnel this process runs
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Local agent: SOCKS5 listener, dials the tunnel server
    #[default]
    #[serde(rename = "client")]
    Client,
    /// Remote agent: accepts tunnel connections, dials destinations
    #[serde(rename = "server")]
    Server,
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Client or server mode
    #[serde(default)]
    pub mode: Mode,

    /// Local SOCKS5 listen address (TCP and UDP), client mode only
    #[serde(default = "default_local_addr")]
    pub local_addr: String,

    /// Tunnel server address: dialed by the client, bound by the server.
    /// A bare `:port` means all interfaces (server) or loopback (client).
    #[serde(default = "default_server_addr")]
    pub server_addr: String,

    /// Dial private-network IP literals directly instead of tunneling them
    #[serde(default)]
    pub bypass_private: bool,

    /// Certificate material for the mutual-TLS handshake
    #[serde(default)]
    pub tls: TlsConfig,

    /// QUIC transport tuning
    #[serde(default)]
    pub transport: TransportConfig,

    /// Flow and dial timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mode: Mode::default(),
            local_addr: default_local_addr(),
            server_addr: default_server_addr(),
            bypass_private: false,
            tls: TlsConfig::default(),
            transport: TransportConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl Config {
    /// Address the server binds its QUIC endpoint to
    pub fn server_bind_addr(&self) -> Result<SocketAddr, String> {
        parse_addr(&self.server_addr, "0.0.0.0")
    }

    /// Address string the client dials (host may be a domain name)
    pub fn server_dial_addr(&self) -> String {
        with_default_host(&self.server_addr, "127.0.0.1")
    }

    /// Local SOCKS5 listen address
    pub fn local_bind_addr(&self) -> Result<SocketAddr, String> {
        parse_addr(&self.local_addr, "127.0.0.1")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        match self.mode {
            Mode::Client => {
                self.local_bind_addr()?;
            }
            Mode::Server => {
                self.server_bind_addr()?;
            }
        }
        self.tls.validate()?;
        self.transport.validate()?;
        self.timeouts.validate()
    }
}

fn with_default_host(addr: &str, host: &str) -> String {
    if addr.starts_with(':') {
        format!("{}{}", host, addr)
    } else {
        addr.to_string()
    }
}

fn parse_addr(addr: &str, host: &str) -> Result<SocketAddr, String> {
    let full = with_default_host(addr, host);
    full.parse()
        .map_err(|e| format!("Invalid socket address '{}': {}", addr, e))
}

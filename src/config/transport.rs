//! Transport configuration types
//!
//! Defines configuration for the QUIC tunnel and its TLS material.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default TLS server name presented by the client
fn default_server_name() -> String {
    "localhost".to_string()
}

/// Default for skipping server certificate verification on the client
fn default_skip_verify() -> bool {
    true
}

/// TLS material for the mutual-certificate handshake
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TlsConfig {
    /// Own certificate chain (PEM)
    #[serde(default)]
    pub cert: Option<PathBuf>,

    /// Own private key (PEM, PKCS#8, PKCS#1 or SEC1)
    #[serde(default)]
    pub key: Option<PathBuf>,

    /// Trust anchors for the peer certificate (PEM).
    /// The server requires client certificates issued by these roots.
    #[serde(default)]
    pub ca: Option<PathBuf>,

    /// Server name the client verifies against
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Client only: accept any server certificate. The client certificate
    /// is still presented and verified by the server. Defaults to `true`,
    /// so the server is unauthenticated unless this is set to `false`.
    #[serde(default = "default_skip_verify")]
    pub skip_verify: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        TlsConfig {
            cert: None,
            key: None,
            ca: None,
            server_name: default_server_name(),
            skip_verify: default_skip_verify(),
        }
    }
}

impl TlsConfig {
    /// Validate that all certificate paths are configured
    pub fn validate(&self) -> Result<(), String> {
        if self.cert.is_none() {
            return Err("TLS cert path is required".to_string());
        }
        if self.key.is_none() {
            return Err("TLS key path is required".to_string());
        }
        if self.ca.is_none() {
            return Err("TLS ca path is required".to_string());
        }
        Ok(())
    }
}

/// Default handshake idle timeout in seconds
fn default_handshake_idle_secs() -> u64 {
    10
}

/// Default connection idle timeout in seconds
fn default_max_idle_secs() -> u64 {
    30
}

/// Default keep-alive interval in seconds
fn default_keep_alive_secs() -> u64 {
    10
}

/// Default concurrent stream limit per connection
fn default_max_streams() -> u32 {
    1024
}

/// QUIC transport configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransportConfig {
    /// Upper bound on the QUIC/TLS handshake
    #[serde(default = "default_handshake_idle_secs")]
    pub handshake_idle_secs: u64,

    /// Connection is dropped after this long without any packet
    #[serde(default = "default_max_idle_secs")]
    pub max_idle_secs: u64,

    /// Keep-alive ping interval; must be below `max_idle_secs`
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Concurrent bidirectional and unidirectional streams per connection
    #[serde(default = "default_max_streams")]
    pub max_streams: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            handshake_idle_secs: default_handshake_idle_secs(),
            max_idle_secs: default_max_idle_secs(),
            keep_alive_secs: default_keep_alive_secs(),
            max_streams: default_max_streams(),
        }
    }
}

impl TransportConfig {
    /// Validate timeout relationships
    pub fn validate(&self) -> Result<(), String> {
        if self.keep_alive_secs == 0 || self.keep_alive_secs >= self.max_idle_secs {
            return Err(format!(
                "keep_alive_secs ({}) must be non-zero and below max_idle_secs ({})",
                self.keep_alive_secs, self.max_idle_secs
            ));
        }
        if self.max_streams == 0 {
            return Err("max_streams must be greater than 0".to_string());
        }
        Ok(())
    }
}

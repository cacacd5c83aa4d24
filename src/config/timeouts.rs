//! Flow timeout configuration
//!
//! Defines the inactivity, dial and handshake-freshness windows.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default UDP flow inactivity window in seconds
fn default_flow_idle_secs() -> u64 {
    60
}

/// Default outbound dial timeout in seconds
fn default_dial_secs() -> u64 {
    60
}

/// Default handshake freshness window in seconds
fn default_handshake_window_secs() -> u64 {
    60
}

/// Timeouts applied to individual flows
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimeoutConfig {
    /// UDP relay read deadline and idle flow window
    #[serde(default = "default_flow_idle_secs")]
    pub flow_idle_secs: u64,

    /// Bound on bypass dials and server-to-destination dials
    #[serde(default = "default_dial_secs")]
    pub dial_secs: u64,

    /// Maximum age of a tunnel handshake accepted by the server
    #[serde(default = "default_handshake_window_secs")]
    pub handshake_window_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            flow_idle_secs: default_flow_idle_secs(),
            dial_secs: default_dial_secs(),
            handshake_window_secs: default_handshake_window_secs(),
        }
    }
}

impl TimeoutConfig {
    /// UDP flow inactivity window
    pub fn flow_idle(&self) -> Duration {
        Duration::from_secs(self.flow_idle_secs)
    }

    /// Outbound dial timeout
    pub fn dial(&self) -> Duration {
        Duration::from_secs(self.dial_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.flow_idle_secs == 0 {
            return Err("flow_idle_secs must be greater than 0".to_string());
        }
        if self.dial_secs == 0 {
            return Err("dial_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

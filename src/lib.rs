//! # Sockquic - SOCKS5 over a mutually-authenticated QUIC tunnel
//!
//! Sockquic runs as one of two agents. The client agent exposes a local
//! SOCKS5 endpoint (CONNECT and UDP ASSOCIATE) and carries every flow to
//! the server agent over a single multiplexed QUIC connection. The server
//! agent checks each flow's handshake and dials the real destination.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sockquic::config::load_config;
//! use sockquic::client::run_client;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("client.toml")?;
//!     let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_client(config, shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! Each flow is declared on its own unidirectional stream (a bincode
//! handshake with a timestamp and nonce) and then carried verbatim on the
//! next bidirectional stream.
//!
//! ```text
//! SOCKS5 Client -> Client Agent ==QUIC==> Server Agent -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod socks;
pub mod transport;

// Re-export commonly used items
pub use client::run_client;
pub use config::{load_config, Config, Mode};
pub use error::{Socks5Error, SockquicError};
pub use server::run_server;

use anyhow::Result;
use tokio::sync::broadcast;

/// Version of the Sockquic library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Run the agent selected by `config.mode`
pub async fn run(config: Config, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    match config.mode {
        Mode::Client => run_client(config, shutdown_rx).await,
        Mode::Server => run_server(config, shutdown_rx).await,
    }
}

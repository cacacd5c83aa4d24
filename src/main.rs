//! Sockquic - SOCKS5 over a mutually-authenticated QUIC tunnel
//!
//! This is the main entry point for the Sockquic application.

use anyhow::Result;
use clap::Parser;
use sockquic::config::{load_config, Config, Mode};
use sockquic::SockquicError;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Sockquic - SOCKS5 proxy tunneled over QUIC with mutual TLS
#[derive(Parser, Debug)]
#[command(name = "sockquic")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run as the server agent
    #[arg(short = 'S', long)]
    server: bool,

    /// Local SOCKS5 listen address (client)
    #[arg(short = 'l', long)]
    local: Option<String>,

    /// Tunnel server address (dialed by the client, bound by the server)
    #[arg(short = 's', long = "server-addr")]
    server_addr: Option<String>,

    /// Certificate chain (PEM)
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Private key (PEM)
    #[arg(long)]
    key: Option<PathBuf>,

    /// CA certificate used to verify the peer (PEM)
    #[arg(long)]
    ca: Option<PathBuf>,

    /// Dial private addresses directly instead of through the tunnel
    #[arg(long)]
    bypass: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

impl Args {
    /// Build the effective configuration: file values, then flags
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => Config::default(),
        };

        if self.server {
            config.mode = Mode::Server;
        }
        if let Some(local) = self.local {
            config.local_addr = local;
        }
        if let Some(server_addr) = self.server_addr {
            config.server_addr = server_addr;
        }
        if let Some(cert) = self.cert {
            config.tls.cert = Some(cert);
        }
        if let Some(key) = self.key {
            config.tls.key = Some(key);
        }
        if let Some(ca) = self.ca {
            config.tls.ca = Some(ca);
        }
        if self.bypass {
            config.bypass_private = true;
        }

        config.validate().map_err(SockquicError::Config)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    if let Some(path) = &args.config {
        info!("Configuration loaded from: {:?}", path);
    }
    let config = args.into_config()?;

    info!("Sockquic v{}", sockquic::VERSION);
    match config.mode {
        Mode::Client => info!("Mode: client, SOCKS5 on {}", config.local_addr),
        Mode::Server => info!("Mode: server, tunnel on {}", config.server_addr),
    }

    // Setup shutdown signal
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    // Handle Ctrl+C and termination signals (cross-platform)
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    tracing::error!("Failed to setup SIGTERM handler: {}", e);
                    return;
                }
            };

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down...");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            // On Windows, only handle Ctrl+C
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down...");
        }

        let _ = shutdown_tx_clone.send(true);
    });

    sockquic::run(config, shutdown_rx).await
}

/// Setup logging based on configuration
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

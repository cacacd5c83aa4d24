//! Test utilities for Sockquic
//!
//! This module provides common test utilities used across integration tests:
//! echo targets, a minimal SOCKS5 client, and agent wiring over the
//! in-memory transport.

#![allow(dead_code)]

use sockquic::client::{Client, TunnelClient};
use sockquic::config::{Config, TimeoutConfig};
use sockquic::server::TunnelServer;
use sockquic::transport::memory::{self, MemoryConnector};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::broadcast;

/// Path of a file under `tests/fixtures`
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Spawn a TCP server that echoes everything back on each connection
pub async fn spawn_tcp_echo() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut read, mut write) = stream.split();
                let _ = tokio::io::copy(&mut read, &mut write).await;
            });
        }
    });
    addr
}

/// Spawn a UDP server that echoes every datagram to its sender
pub async fn spawn_udp_echo() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 65535];
        while let Ok((n, from)) = socket.recv_from(&mut buf).await {
            let _ = socket.send_to(&buf[..n], from).await;
        }
    });
    addr
}

/// Test configuration builder
pub struct TestConfigBuilder {
    config: Config,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        TestConfigBuilder {
            config: Config {
                local_addr: "127.0.0.1:0".to_string(),
                server_addr: "127.0.0.1:0".to_string(),
                timeouts: TimeoutConfig {
                    flow_idle_secs: 2,
                    dial_secs: 2,
                    handshake_window_secs: 60,
                },
                ..Default::default()
            },
        }
    }
}

impl TestConfigBuilder {
    /// Create a new test config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set server address
    pub fn server_addr(mut self, addr: &str) -> Self {
        self.config.server_addr = addr.to_string();
        self
    }

    /// Dial private addresses directly
    pub fn bypass_private(mut self, bypass: bool) -> Self {
        self.config.bypass_private = bypass;
        self
    }

    /// Use the fixture certificate pair `<name>.pem` / `<name>.key`
    pub fn certificate(mut self, name: &str) -> Self {
        self.config.tls.cert = Some(fixture(&format!("{}.pem", name)));
        self.config.tls.key = Some(fixture(&format!("{}.key", name)));
        self.config.tls.ca = Some(fixture("ca.pem"));
        self
    }

    /// Verify the server certificate on the client
    pub fn verify_server(mut self, verify: bool) -> Self {
        self.config.tls.skip_verify = !verify;
        self
    }

    /// Build the config
    pub fn build(self) -> Config {
        self.config
    }
}

/// Both agents wired over the in-memory transport
pub struct MemoryAgents {
    /// SOCKS5 listen address of the client agent
    pub proxy_addr: SocketAddr,
    /// The client agent's tunnel
    pub tunnel: Arc<TunnelClient<MemoryConnector>>,
    /// Stops both agents when sent to
    pub shutdown_tx: broadcast::Sender<bool>,
}

/// Start a client and a server agent connected in-process
pub async fn spawn_memory_agents(config: Config) -> MemoryAgents {
    let (connector, acceptor) = memory::channel();
    let (shutdown_tx, _) = broadcast::channel(1);

    let server = TunnelServer::new(acceptor, config.timeouts.clone());
    tokio::spawn(server.run(shutdown_tx.subscribe()));

    let client = Client::bind(&config, connector).await.unwrap();
    let proxy_addr = client.local_addr().unwrap();
    let tunnel = client.tunnel().clone();
    tokio::spawn(client.run(shutdown_tx.subscribe()));

    MemoryAgents {
        proxy_addr,
        tunnel,
        shutdown_tx,
    }
}

/// Perform the no-auth greeting
pub async fn socks5_greet(stream: &mut TcpStream) {
    stream.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x00]);
}

/// Encode a SOCKS5 address (ATYP, address, port)
pub fn encode_addr(addr: SocketAddr) -> Vec<u8> {
    let mut buf = Vec::new();
    match addr.ip() {
        IpAddr::V4(ip) => {
            buf.push(0x01);
            buf.extend_from_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            buf.push(0x04);
            buf.extend_from_slice(&ip.octets());
        }
    }
    buf.extend_from_slice(&addr.port().to_be_bytes());
    buf
}

/// Send a request and return the reply code and bound address
pub async fn socks5_request(
    stream: &mut TcpStream,
    command: u8,
    target: SocketAddr,
) -> (u8, SocketAddr) {
    let mut request = vec![0x05, command, 0x00];
    request.extend_from_slice(&encode_addr(target));
    stream.write_all(&request).await.unwrap();

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await.unwrap();
    let ip = match head[3] {
        0x01 => {
            let mut octets = [0u8; 4];
            stream.read_exact(&mut octets).await.unwrap();
            IpAddr::from(octets)
        }
        0x04 => {
            let mut octets = [0u8; 16];
            stream.read_exact(&mut octets).await.unwrap();
            IpAddr::from(octets)
        }
        other => panic!("unexpected address type in reply: {}", other),
    };
    let port = stream.read_u16().await.unwrap();

    (head[1], SocketAddr::new(ip, port))
}

/// Open a SOCKS5 CONNECT through `proxy` and return the connected stream
pub async fn socks5_connect(proxy: SocketAddr, target: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    socks5_greet(&mut stream).await;
    let (code, _) = socks5_request(&mut stream, 0x01, target).await;
    assert_eq!(code, 0x00, "CONNECT to {} failed", target);
    stream
}

/// Open a UDP association; returns the control connection and relay address
pub async fn socks5_udp_associate(proxy: SocketAddr) -> (TcpStream, SocketAddr) {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    socks5_greet(&mut stream).await;
    let (code, relay) = socks5_request(&mut stream, 0x03, "0.0.0.0:0".parse().unwrap()).await;
    assert_eq!(code, 0x00);
    (stream, relay)
}

/// SOCKS5 UDP header (`RSV FRAG ATYP DST.ADDR DST.PORT`) for `target`
pub fn udp_header(target: SocketAddr) -> Vec<u8> {
    let mut header = vec![0x00, 0x00, 0x00];
    header.extend_from_slice(&encode_addr(target));
    header
}

/// Encapsulate `payload` for `target`
pub fn udp_datagram(target: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let mut datagram = udp_header(target);
    datagram.extend_from_slice(payload);
    datagram
}

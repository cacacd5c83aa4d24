//! End-to-end flows over a real QUIC connection with mutual TLS

mod common;

use common::*;
use sockquic::client::Client;
use sockquic::config::Config;
use sockquic::server::TunnelServer;
use sockquic::transport::{QuicAcceptor, QuicConnector, TlsProvider, TunnelConnector};
use sockquic::SockquicError;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

/// Start a QUIC server agent; returns its address
async fn spawn_quic_server(shutdown_rx: broadcast::Receiver<bool>) -> SocketAddr {
    let config = TestConfigBuilder::new().certificate("server").build();
    let tls = TlsProvider::from_config(&config.tls).unwrap();
    let acceptor =
        QuicAcceptor::bind("127.0.0.1:0".parse().unwrap(), &tls, &config.transport).unwrap();

    let server = TunnelServer::new(acceptor, config.timeouts.clone());
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run(shutdown_rx));
    addr
}

/// Start a QUIC client agent dialing `server`; returns its SOCKS5 address
async fn spawn_quic_client(config: Config, shutdown_rx: broadcast::Receiver<bool>) -> SocketAddr {
    let tls = TlsProvider::from_config(&config.tls).unwrap();
    let connector =
        QuicConnector::new(&config.server_dial_addr(), &tls, &config.transport).unwrap();

    let client = Client::bind(&config, connector).await.unwrap();
    let addr = client.local_addr().unwrap();
    tokio::spawn(client.run(shutdown_rx));
    addr
}

#[tokio::test]
async fn test_quic_connect_round_trip() {
    let (shutdown_tx, _) = broadcast::channel(1);
    let echo = spawn_tcp_echo().await;
    let server = spawn_quic_server(shutdown_tx.subscribe()).await;

    let config = TestConfigBuilder::new()
        .server_addr(&server.to_string())
        .certificate("client")
        .build();
    let proxy = spawn_quic_client(config, shutdown_tx.subscribe()).await;

    for round in 0..3 {
        let mut stream = socks5_connect(proxy, echo).await;
        let payload = format!("quic round {}", round);
        stream.write_all(payload.as_bytes()).await.unwrap();

        let mut buf = vec![0u8; payload.len()];
        tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(buf, payload.as_bytes());
    }
}

#[tokio::test]
async fn test_quic_destination_speaks_first() {
    let (shutdown_tx, _) = broadcast::channel(1);
    let (listener, banner_server) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = stream.write_all(b"SSH-2.0-banner\r\n").await;
                let mut sink = Vec::new();
                let _ = stream.read_to_end(&mut sink).await;
            });
        }
    });
    let server = spawn_quic_server(shutdown_tx.subscribe()).await;

    let config = TestConfigBuilder::new()
        .server_addr(&server.to_string())
        .certificate("client")
        .build();
    let proxy = spawn_quic_client(config, shutdown_tx.subscribe()).await;

    // Nothing is written by the application before the banner arrives
    let mut stream = socks5_connect(proxy, banner_server).await;
    let mut banner = [0u8; 16];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut banner))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&banner, b"SSH-2.0-banner\r\n");
}

#[tokio::test]
async fn test_quic_verified_server_certificate() {
    let (shutdown_tx, _) = broadcast::channel(1);
    let echo = spawn_tcp_echo().await;
    let server = spawn_quic_server(shutdown_tx.subscribe()).await;

    let config = TestConfigBuilder::new()
        .server_addr(&server.to_string())
        .certificate("client")
        .verify_server(true)
        .build();
    let proxy = spawn_quic_client(config, shutdown_tx.subscribe()).await;

    let mut stream = socks5_connect(proxy, echo).await;
    stream.write_all(b"verified").await.unwrap();
    let mut buf = [0u8; 8];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"verified");
}

#[tokio::test]
async fn test_quic_udp_round_trip() {
    let (shutdown_tx, _) = broadcast::channel(1);
    let echo = spawn_udp_echo().await;
    let server = spawn_quic_server(shutdown_tx.subscribe()).await;

    let config = TestConfigBuilder::new()
        .server_addr(&server.to_string())
        .certificate("client")
        .build();
    let proxy = spawn_quic_client(config, shutdown_tx.subscribe()).await;

    let (_control, relay) = socks5_udp_associate(proxy).await;
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket
        .send_to(&udp_datagram(echo, b"over quic"), relay)
        .await
        .unwrap();

    let mut buf = [0u8; 256];
    let (n, _) = tokio::time::timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], &udp_datagram(echo, b"over quic")[..]);
}

#[tokio::test]
async fn test_quic_rejects_certificate_without_client_auth() {
    let (shutdown_tx, _) = broadcast::channel(1);
    let echo = spawn_tcp_echo().await;
    let server = spawn_quic_server(shutdown_tx.subscribe()).await;

    // The server certificate lacks the clientAuth usage
    let config = TestConfigBuilder::new()
        .server_addr(&server.to_string())
        .certificate("server")
        .build();
    let proxy = spawn_quic_client(config, shutdown_tx.subscribe()).await;

    let mut stream = tokio::net::TcpStream::connect(proxy).await.unwrap();
    socks5_greet(&mut stream).await;
    let (code, _) = socks5_request(&mut stream, 0x01, echo).await;

    if code == 0x00 {
        // The flow may open before the server's rejection arrives; no data
        // must come back through it either way
        let _ = stream.write_all(b"ping").await;
        let mut buf = [0u8; 4];
        let echoed =
            tokio::time::timeout(Duration::from_secs(3), stream.read_exact(&mut buf)).await;
        assert!(!matches!(echoed, Ok(Ok(_))));
    } else {
        assert_eq!(code, 0x05);
    }
}

#[tokio::test]
async fn test_quic_dial_without_server_times_out() {
    // Bound but silent: nothing answers the QUIC handshake
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let mut config = TestConfigBuilder::new()
        .server_addr(&silent.local_addr().unwrap().to_string())
        .certificate("client")
        .build();
    config.transport.handshake_idle_secs = 1;
    let tls = TlsProvider::from_config(&config.tls).unwrap();
    let connector =
        QuicConnector::new(&config.server_dial_addr(), &tls, &config.transport).unwrap();

    let err = tokio::time::timeout(Duration::from_secs(5), connector.connect())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SockquicError>(),
        Some(SockquicError::Timeout(_))
    ));
}

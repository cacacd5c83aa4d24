//! SOCKS5 module for Sockquic
//!
//! This module implements the local SOCKS5 endpoint: method negotiation,
//! request parsing, CONNECT over the tunnel (or directly for private
//! addresses) and UDP ASSOCIATE through the shared UDP relay.

mod auth;
mod command;
mod consts;
mod handler;
mod tcp_relay;
mod types;
mod udp;

pub use auth::negotiate;
pub use command::{
    build_reply, parse_request, read_request, send_no_auth, send_reply, send_udp_associate_reply,
};
pub use consts::*;
pub use handler::{handle_socks5, ProxyContext};
pub use tcp_relay::{handle_tcp_connect, is_private_ip};
pub use types::{SocksCommand, SocksRequest, TargetAddr};
pub use udp::{
    advertised_relay_addr, encode_udp_header, frame_datagram, handle_udp_associate,
    parse_udp_envelope, split_udp_envelope, UdpEnvelope, UdpRelay,
};

//! UDP support for SOCKS5
//!
//! This module implements the UDP ASSOCIATE command and the client-side
//! relay that carries SOCKS5 UDP datagrams over tunnel flows.

mod associate;
mod packet;
mod relay;

pub use associate::{advertised_relay_addr, handle_udp_associate};
pub use packet::{
    encode_udp_header, frame_datagram, parse_udp_envelope, split_udp_envelope, UdpEnvelope,
};
pub use relay::UdpRelay;

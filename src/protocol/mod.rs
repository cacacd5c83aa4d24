//! Protocol module for Sockquic
//!
//! This module implements the tunnel handshake exchanged between the
//! client and server agents ahead of every flow stream.

mod codec;
mod nonce;
mod types;

pub use codec::{
    decode_handshake, encode_handshake, read_flow_open, read_handshake, write_flow_open,
    write_handshake,
};
pub use nonce::{NonceGenerator, NONCE_ALPHABET, NONCE_MAX_LEN, NONCE_MIN_LEN};
pub use types::{
    unix_now, HandshakeRequest, Network, ALPN_PROTOCOL, FLOW_OPEN_MARKER, MAX_HANDSHAKE_LEN,
};

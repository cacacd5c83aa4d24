//! SOCKS5 command parsing module
//!
//! Handles parsing SOCKS5 commands and building replies.

mod parser;
mod reply;

pub use parser::{parse_request, read_request};
pub use reply::{build_reply, send_no_auth, send_reply, send_udp_associate_reply};

//! Local network helpers.

mod interface;
mod mac;

pub use interface::{find_interface, ipv4_of, local_ipv4};
pub use mac::parse_mac;

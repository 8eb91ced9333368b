//! Packet codecs the forwarding core reads and rewrites
//!
//! Only the headers the controller touches are modeled: Ethernet with an
//! optional 802.1Q tag, ARP and the IPv4 fixed header.

pub mod arp;
pub mod ethernet;
pub mod ipv4;
pub mod types;

pub use types::*;

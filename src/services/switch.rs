//! Connected switches and the write channel to them

use crate::openflow::{wildcards, DatapathId, OfMessage, PacketIn};
use crate::Result;
use std::sync::Arc;

/// Capabilities a switch reports at handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchAttributes {
    /// Nicira TTL decrement extension
    pub supports_ttl_decrement: bool,
    /// Table requires exact ether-type and network addresses
    pub requires_l3_match: bool,
    /// Fields the switch can wildcard in hardware
    pub fast_wildcards: u32,
}

impl Default for SwitchAttributes {
    fn default() -> Self {
        Self {
            supports_ttl_decrement: false,
            requires_l3_match: false,
            fast_wildcards: wildcards::ALL,
        }
    }
}

pub trait OfSwitch: Send + Sync {
    fn id(&self) -> DatapathId;

    fn attributes(&self) -> SwitchAttributes;

    /// Queue a message. Writes to one switch are serialized by the transport.
    fn write(&self, msg: OfMessage) -> Result<()>;

    /// Push queued messages to the wire
    fn flush(&self) -> Result<()>;
}

pub trait SwitchProvider: Send + Sync {
    /// Connected switch, if any
    fn switch(&self, dpid: DatapathId) -> Option<Arc<dyn OfSwitch>>;

    /// Feed a synthetic packet-in back through the controller pipeline
    fn inject_packet_in(&self, dpid: DatapathId, packet_in: PacketIn) -> bool;
}

//! OpenFlow 1.0 message encoding
//!
//! Only the messages the forwarding core emits or consumes are modeled:
//! FLOW_MOD, PACKET_OUT and PACKET_IN, plus the match structure and the
//! action set used when compiling routes.

pub mod action;
pub mod message;
pub mod ofmatch;

pub use action::Action;
pub use message::{
    FlowMod, FlowModCommand, OfMessage, PacketIn, PacketInReason, PacketOut, BUFFER_ID_NONE,
    OFPFF_SEND_FLOW_REM, OFPP_NONE, OFP_VERSION,
};
pub use ofmatch::{wildcards, OfMatch};

/// Switch datapath id
pub type DatapathId = u64;

/// OpenFlow 1.0 port number
pub type PortNo = u16;

/// Reserved port numbers
pub mod port {
    use super::PortNo;

    pub const MAX: PortNo = 0xff00;
    pub const IN_PORT: PortNo = 0xfff8;
    pub const FLOOD: PortNo = 0xfffb;
    pub const ALL: PortNo = 0xfffc;
    pub const CONTROLLER: PortNo = 0xfffd;
    pub const LOCAL: PortNo = 0xfffe;
    pub const NONE: PortNo = 0xffff;
}

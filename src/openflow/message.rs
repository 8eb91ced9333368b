//! FLOW_MOD, PACKET_OUT and PACKET_IN

use super::action::{actions_len, encode_actions, Action};
use super::ofmatch::{OfMatch, MATCH_LEN};
use super::PortNo;
use crate::{Error, Result};

pub const OFP_VERSION: u8 = 0x01;
pub const HEADER_LEN: usize = 8;

pub const BUFFER_ID_NONE: u32 = 0xffff_ffff;
pub const OFPP_NONE: PortNo = 0xffff;
pub const OFPFF_SEND_FLOW_REM: u16 = 1 << 0;

const OFPT_PACKET_IN: u8 = 10;
const OFPT_PACKET_OUT: u8 = 13;
const OFPT_FLOW_MOD: u8 = 14;

const FLOW_MOD_LEN: usize = HEADER_LEN + MATCH_LEN + 24;
const PACKET_OUT_LEN: usize = HEADER_LEN + 8;
const PACKET_IN_LEN: usize = HEADER_LEN + 10;

/// 16-bit length field for `len` bytes
fn wire_len(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len)
        .map_err(|_| Error::Encode(format!("{} length {} exceeds {}", what, len, u16::MAX)))
}

fn write_header(buf: &mut Vec<u8>, kind: u8, length: usize, xid: u32) -> Result<()> {
    let length = wire_len(length, "message")?;
    buf.push(OFP_VERSION);
    buf.push(kind);
    buf.extend_from_slice(&length.to_be_bytes());
    buf.extend_from_slice(&xid.to_be_bytes());
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FlowModCommand {
    Add = 0,
    Modify = 1,
    Delete = 3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowMod {
    pub of_match: OfMatch,
    pub cookie: u64,
    pub command: FlowModCommand,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub priority: u16,
    pub buffer_id: u32,
    pub out_port: PortNo,
    pub flags: u16,
    pub actions: Vec<Action>,
}

impl FlowMod {
    pub fn new(of_match: OfMatch, command: FlowModCommand) -> Self {
        Self {
            of_match,
            cookie: 0,
            command,
            idle_timeout: 0,
            hard_timeout: 0,
            priority: 0,
            buffer_id: BUFFER_ID_NONE,
            out_port: OFPP_NONE,
            flags: 0,
            actions: Vec::new(),
        }
    }

    pub fn sends_flow_removed(&self) -> bool {
        self.flags & OFPFF_SEND_FLOW_REM != 0
    }

    pub fn output_ports(&self) -> Vec<PortNo> {
        self.actions
            .iter()
            .filter_map(|action| match action {
                Action::Output { port, .. } => Some(*port),
                _ => None,
            })
            .collect()
    }

    pub fn encoded_len(&self) -> usize {
        FLOW_MOD_LEN + actions_len(&self.actions)
    }

    pub fn write_to(&self, buf: &mut Vec<u8>, xid: u32) -> Result<()> {
        write_header(buf, OFPT_FLOW_MOD, self.encoded_len(), xid)?;
        buf.extend_from_slice(&self.of_match.to_bytes());
        buf.extend_from_slice(&self.cookie.to_be_bytes());
        buf.extend_from_slice(&(self.command as u16).to_be_bytes());
        buf.extend_from_slice(&self.idle_timeout.to_be_bytes());
        buf.extend_from_slice(&self.hard_timeout.to_be_bytes());
        buf.extend_from_slice(&self.priority.to_be_bytes());
        buf.extend_from_slice(&self.buffer_id.to_be_bytes());
        buf.extend_from_slice(&self.out_port.to_be_bytes());
        buf.extend_from_slice(&self.flags.to_be_bytes());
        encode_actions(&self.actions, buf);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketOut {
    pub buffer_id: u32,
    pub in_port: PortNo,
    pub actions: Vec<Action>,
    pub data: Vec<u8>,
}

impl PacketOut {
    /// Packet-out carrying the raw frame
    pub fn unbuffered(in_port: PortNo, actions: Vec<Action>, data: Vec<u8>) -> Self {
        Self {
            buffer_id: BUFFER_ID_NONE,
            in_port,
            actions,
            data,
        }
    }

    pub fn output_ports(&self) -> Vec<PortNo> {
        self.actions
            .iter()
            .filter_map(|action| match action {
                Action::Output { port, .. } => Some(*port),
                _ => None,
            })
            .collect()
    }

    pub fn encoded_len(&self) -> usize {
        let data_len = if self.buffer_id == BUFFER_ID_NONE {
            self.data.len()
        } else {
            0
        };
        PACKET_OUT_LEN + actions_len(&self.actions) + data_len
    }

    pub fn write_to(&self, buf: &mut Vec<u8>, xid: u32) -> Result<()> {
        let actions_len = wire_len(actions_len(&self.actions), "PACKET_OUT actions")?;
        write_header(buf, OFPT_PACKET_OUT, self.encoded_len(), xid)?;
        buf.extend_from_slice(&self.buffer_id.to_be_bytes());
        buf.extend_from_slice(&self.in_port.to_be_bytes());
        buf.extend_from_slice(&actions_len.to_be_bytes());
        encode_actions(&self.actions, buf);
        // switch-buffered packets carry no data
        if self.buffer_id == BUFFER_ID_NONE {
            buf.extend_from_slice(&self.data);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketInReason {
    NoMatch = 0,
    Action = 1,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketIn {
    pub buffer_id: u32,
    pub total_len: u16,
    pub in_port: PortNo,
    pub reason: PacketInReason,
    pub data: Vec<u8>,
}

impl PacketIn {
    pub fn new(in_port: PortNo, data: Vec<u8>) -> Self {
        Self {
            buffer_id: BUFFER_ID_NONE,
            total_len: u16::try_from(data.len()).unwrap_or(u16::MAX),
            in_port,
            reason: PacketInReason::NoMatch,
            data,
        }
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < PACKET_IN_LEN {
            return Err(Error::Parse("PACKET_IN too short".into()));
        }
        if buf[0] != OFP_VERSION || buf[1] != OFPT_PACKET_IN {
            return Err(Error::Parse("not an OpenFlow 1.0 PACKET_IN".into()));
        }
        let length = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        if length < PACKET_IN_LEN || length > buf.len() {
            return Err(Error::Parse("PACKET_IN length mismatch".into()));
        }
        let reason = match buf[16] {
            0 => PacketInReason::NoMatch,
            1 => PacketInReason::Action,
            other => return Err(Error::Parse(format!("unknown PACKET_IN reason {}", other))),
        };

        Ok(Self {
            buffer_id: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            total_len: u16::from_be_bytes([buf[12], buf[13]]),
            in_port: u16::from_be_bytes([buf[14], buf[15]]),
            reason,
            data: buf[PACKET_IN_LEN..length].to_vec(),
        })
    }

    pub fn write_to(&self, buf: &mut Vec<u8>, xid: u32) -> Result<()> {
        write_header(buf, OFPT_PACKET_IN, PACKET_IN_LEN + self.data.len(), xid)?;
        buf.extend_from_slice(&self.buffer_id.to_be_bytes());
        buf.extend_from_slice(&self.total_len.to_be_bytes());
        buf.extend_from_slice(&self.in_port.to_be_bytes());
        buf.push(self.reason as u8);
        buf.push(0);
        buf.extend_from_slice(&self.data);
        Ok(())
    }
}

/// Message handed to a switch connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfMessage {
    FlowMod(FlowMod),
    PacketOut(PacketOut),
}

impl OfMessage {
    pub fn to_bytes(&self, xid: u32) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            OfMessage::FlowMod(fm) => fm.write_to(&mut buf, xid)?,
            OfMessage::PacketOut(po) => po.write_to(&mut buf, xid)?,
        }
        Ok(buf)
    }
}

impl From<FlowMod> for OfMessage {
    fn from(fm: FlowMod) -> Self {
        OfMessage::FlowMod(fm)
    }
}

impl From<PacketOut> for OfMessage {
    fn from(po: PacketOut) -> Self {
        OfMessage::PacketOut(po)
    }
}

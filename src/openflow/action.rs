//! Flow and packet-out actions

use super::PortNo;
use crate::protocol::MacAddr;
use std::net::Ipv4Addr;

const OFPAT_OUTPUT: u16 = 0;
const OFPAT_SET_VLAN_VID: u16 = 1;
const OFPAT_STRIP_VLAN: u16 = 3;
const OFPAT_SET_DL_SRC: u16 = 4;
const OFPAT_SET_DL_DST: u16 = 5;
const OFPAT_VENDOR: u16 = 0xffff;

const NICIRA_VENDOR_ID: u32 = 0x0000_2320;
const NXAST_DEC_TTL: u16 = 18;
const BSN_VENDOR_ID: u32 = 0x005c_16c7;
const BSN_SET_TUNNEL_DST: u32 = 2;

/// Send the whole packet to the controller / port
pub const OUTPUT_MAX_LEN: u16 = 0xffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Output { port: PortNo, max_len: u16 },
    SetVlanId(u16),
    StripVlan,
    SetDlSrc(MacAddr),
    SetDlDst(MacAddr),
    /// Nicira extension: decrement IP TTL
    DecTtl,
    /// Big Switch extension: tunnel destination IP
    SetTunnelDst(Ipv4Addr),
}

impl Action {
    pub fn output(port: PortNo) -> Self {
        Action::Output {
            port,
            max_len: OUTPUT_MAX_LEN,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Action::Output { .. } | Action::SetVlanId(_) | Action::StripVlan => 8,
            Action::SetDlSrc(_) | Action::SetDlDst(_) | Action::DecTtl | Action::SetTunnelDst(_) => {
                16
            }
        }
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) {
        let start = buf.len();
        let (kind, len) = match self {
            Action::Output { .. } => (OFPAT_OUTPUT, 8u16),
            Action::SetVlanId(_) => (OFPAT_SET_VLAN_VID, 8),
            Action::StripVlan => (OFPAT_STRIP_VLAN, 8),
            Action::SetDlSrc(_) => (OFPAT_SET_DL_SRC, 16),
            Action::SetDlDst(_) => (OFPAT_SET_DL_DST, 16),
            Action::DecTtl | Action::SetTunnelDst(_) => (OFPAT_VENDOR, 16),
        };
        buf.extend_from_slice(&kind.to_be_bytes());
        buf.extend_from_slice(&len.to_be_bytes());

        match *self {
            Action::Output { port, max_len } => {
                buf.extend_from_slice(&port.to_be_bytes());
                buf.extend_from_slice(&max_len.to_be_bytes());
            }
            Action::SetVlanId(vid) => {
                buf.extend_from_slice(&vid.to_be_bytes());
            }
            Action::StripVlan => {}
            Action::SetDlSrc(mac) | Action::SetDlDst(mac) => {
                buf.extend_from_slice(&mac.0);
            }
            Action::DecTtl => {
                buf.extend_from_slice(&NICIRA_VENDOR_ID.to_be_bytes());
                buf.extend_from_slice(&NXAST_DEC_TTL.to_be_bytes());
            }
            Action::SetTunnelDst(ip) => {
                buf.extend_from_slice(&BSN_VENDOR_ID.to_be_bytes());
                buf.extend_from_slice(&BSN_SET_TUNNEL_DST.to_be_bytes());
                buf.extend_from_slice(&ip.octets());
            }
        }

        // zero padding up to the declared length
        buf.resize(start + len as usize, 0);
    }
}

/// Total encoded length of an action list
pub fn actions_len(actions: &[Action]) -> usize {
    actions.iter().map(Action::encoded_len).sum()
}

pub fn encode_actions(actions: &[Action], buf: &mut Vec<u8>) {
    for action in actions {
        action.write_to(buf);
    }
}
